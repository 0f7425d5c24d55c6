use std::path::PathBuf;

use thiserror::Error;

use crate::client::TransportError;

/// Everything that can end a run early. Each variant is fatal by the time it gets here; the only
/// failures that are ever retried are connection-level [`TransportError`]s, and those only become
/// an `Error::Connection` once the retry budget is spent.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),
    #[error("{}", .0.display())]
    InputNotFound(PathBuf),
    #[error("{}: {reason}", .path.display())]
    InputParse { path: PathBuf, reason: String },
    #[error("{0}")]
    Conversion(String),
    #[error("No valid points (coordinates) found.")]
    NoUsablePoints,
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("gave up after {attempts} attempt(s): {source}")]
    Connection {
        attempts: usize,
        #[source]
        source: TransportError,
    },
    #[error("response is not valid JSON: {0}")]
    ResponseParse(#[source] serde_json::Error),
    #[error("request failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl Error {
    /// A short name for the kind of failure, used when nothing more specific can be said.
    pub fn kind(&self) -> String {
        match self {
            Error::Config(_) => "ConfigurationError".to_string(),
            Error::InputNotFound(_) => "InputNotFound".to_string(),
            Error::InputParse { .. } => "InputParseError".to_string(),
            Error::Conversion(_) | Error::NoUsablePoints => "ConversionError".to_string(),
            Error::HttpStatus { .. } => "HttpStatusError".to_string(),
            Error::Connection { .. } => "ConnectionError".to_string(),
            Error::ResponseParse(_) => "ResponseParseError".to_string(),
            Error::Transport(_) => "TransportError".to_string(),
            Error::Io(err) => format!("{:?}", err.kind()),
            Error::Unclassified(_) => "UnclassifiedError".to_string(),
        }
    }

    /// True for the failures that came from talking to the map matching API.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Error::HttpStatus { .. }
                | Error::Connection { .. }
                | Error::ResponseParse(_)
                | Error::Transport(_)
        )
    }

    /// Connection-level failures. By the time one of these ends a run, the retries are used up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// The single line shown to the user when a run stops because of this error.
    pub fn describe(&self) -> String {
        match self {
            Error::InputNotFound(path) => format!("File not found: {}", path.display()),
            Error::InputParse { .. } => format!("Invalid GeoJSON: {}", self),
            Error::Config(_) | Error::Conversion(_) | Error::NoUsablePoints => self.to_string(),
            _ if self.is_api_error() => format!("API error: {}", self),
            _ => format!("Error: {}: {}", self.kind(), self),
        }
    }
}
