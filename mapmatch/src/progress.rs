use std::fmt;
use std::sync::Mutex;

/// How a progress line should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    Success,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receives human-readable progress from a run. This is the only way to observe a run while it's
/// in progress, so implementations shouldn't block for long.
pub trait ProgressSink {
    fn emit(&self, message: &str, severity: Severity);

    fn info(&self, message: &str) {
        self.emit(message, Severity::Info);
    }

    fn error(&self, message: &str) {
        self.emit(message, Severity::Error);
    }

    fn success(&self, message: &str) {
        self.emit(message, Severity::Success);
    }
}

impl<F: Fn(&str, Severity)> ProgressSink for F {
    fn emit(&self, message: &str, severity: Severity) {
        (self)(message, severity)
    }
}

/// Keeps every line in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(String, Severity)>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn lines(&self) -> Vec<(String, Severity)> {
        self.lines.lock().unwrap().clone()
    }

    /// True if some line with this severity contains `needle`.
    pub fn contains(&self, needle: &str, severity: Severity) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(line, sev)| *sev == severity && line.contains(needle))
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, message: &str, severity: Severity) {
        self.lines
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}
