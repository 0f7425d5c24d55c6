//! Talks to the map matching API. The HTTP exchange itself sits behind the [`Transport`] trait;
//! [`ApiClient`] decides what a failure means and whether to try again.

use std::error::Error as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::response::extract_features;
use crate::{Error, ProgressSink};

/// Matching a full batch can be slow on the provider's side.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
// How much of an error response to show the user
const MAX_ERROR_BODY_CHARS: usize = 500;

/// A response that made it back, whatever its status.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// 4xx and 5xx. Anything below is handed on to the JSON parser.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Failures below HTTP. Only `Connection` failures are worth retrying.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Couldn't connect, timed out, or the connection broke while sending or receiving
    #[error("{0}")]
    Connection(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}

/// POSTs a JSON body and hands back the raw response.
pub trait Transport {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        (**self).post_json(url, body)
    }
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<HttpTransport, Error> {
        HttpTransport::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<HttpTransport, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Transport(describe_reqwest_error(err)))?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        debug!("POST {} ({} bytes)", without_query(url), body.len());
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(classify)?;
        debug!("Got {} ({} bytes)", status, body.len());
        Ok(HttpResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    let retryable = err.is_connect() || err.is_timeout() || err.is_request() || err.is_body();
    let msg = describe_reqwest_error(err);
    if retryable {
        TransportError::Connection(msg)
    } else {
        TransportError::Other(msg)
    }
}

// The URL carries the API key, so never let it leak into messages.
fn describe_reqwest_error(err: reqwest::Error) -> String {
    let err = err.without_url();
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Builds the request URL. The API key always travels as a query parameter.
pub fn request_url(api_url: &str, api_key: &str) -> String {
    let separator = if api_url.contains('?') { '&' } else { '?' };
    format!("{}{}apiKey={}", api_url, separator, api_key)
}

/// The URL with its query string (and so the API key) removed.
pub fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

pub struct ApiClient<T: Transport> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> ApiClient<T> {
        ApiClient { transport, retry }
    }

    /// Sends one batch and returns the features from the response. Connection failures are
    /// retried; a 4xx/5xx status or a garbled response fails immediately.
    pub fn submit_batch<B: Serialize>(
        &self,
        body: &B,
        url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Value>, Error> {
        let payload = serde_json::to_vec(body).map_err(|err| Error::Unclassified(err.into()))?;
        let attempts = self.retry.attempts.max(1);

        let mut attempt = 1;
        loop {
            sink.info(&format!(
                "Request: POST {}... (attempt {}/{})",
                without_query(url),
                attempt,
                attempts
            ));
            match self.transport.post_json(url, &payload) {
                Ok(resp) => {
                    sink.info(&format!("Response status: {}", resp.status));
                    return self.handle_response(resp, sink);
                }
                Err(err) if err.is_retryable() => {
                    sink.error(&format!(
                        "Connection error (attempt {}/{}): {}",
                        attempt, attempts, err
                    ));
                    if attempt == attempts {
                        return Err(Error::Connection {
                            attempts,
                            source: err,
                        });
                    }
                    sink.info(&format!(
                        "Waiting {}s before retry...",
                        self.retry.delay.as_secs_f64()
                    ));
                    std::thread::sleep(self.retry.delay);
                    attempt += 1;
                }
                Err(err) => {
                    sink.error(&format!("Request error: {}", err));
                    return Err(Error::Transport(err.to_string()));
                }
            }
        }
    }

    fn handle_response(
        &self,
        resp: HttpResponse,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Value>, Error> {
        if resp.is_error() {
            let body: String = resp.body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            sink.error(&format!("HTTP error: {}", resp.status));
            if !body.is_empty() {
                sink.error(&body);
            }
            return Err(Error::HttpStatus {
                status: resp.status,
                body,
            });
        }

        match serde_json::from_str::<Value>(&resp.body) {
            Ok(json) => Ok(extract_features(&json)),
            Err(err) => {
                sink.error(&format!("Response is not valid JSON: {}", err));
                Err(Error::ResponseParse(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::{MemorySink, Severity};

    struct Scripted {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<HttpResponse, TransportError>>) -> Scripted {
            Scripted {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn num_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Transport for Scripted {
        fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), serde_json::from_slice(body).unwrap()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("more requests than scripted replies")
        }
    }

    fn ok(body: Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn refused() -> Result<HttpResponse, TransportError> {
        Err(TransportError::Connection("connection refused".to_string()))
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn api_key_goes_in_the_query() {
        assert_eq!(
            request_url("https://api.geoapify.com/v1/mapmatching", "secret"),
            "https://api.geoapify.com/v1/mapmatching?apiKey=secret"
        );
        assert_eq!(
            request_url("https://example.com/match?lang=de", "secret"),
            "https://example.com/match?lang=de&apiKey=secret"
        );
        assert_eq!(
            without_query("https://example.com/match?lang=de&apiKey=secret"),
            "https://example.com/match"
        );
    }

    #[test]
    fn sends_the_body_and_extracts_features() {
        let transport = Scripted::new(vec![ok(json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "geometry": null, "properties": {"distance": 12}}],
        }))]);
        let client = ApiClient::new(&transport, no_wait());
        let sink = MemorySink::new();
        let body = json!({"mode": "drive", "waypoints": []});

        let features = client
            .submit_batch(&body, "https://example.com/match?apiKey=secret", &sink)
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["distance"], 12);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, "https://example.com/match?apiKey=secret");
        assert_eq!(calls[0].1, body);

        assert!(sink.contains(
            "Request: POST https://example.com/match... (attempt 1/3)",
            Severity::Info
        ));
        assert!(sink.contains("Response status: 200", Severity::Info));
        assert!(!sink
            .lines()
            .iter()
            .any(|(line, _)| line.contains("secret")));
    }

    #[test]
    fn retries_connection_failures() {
        let transport = Scripted::new(vec![refused(), refused(), ok(json!({"features": []}))]);
        let client = ApiClient::new(&transport, no_wait());
        let sink = MemorySink::new();

        let features = client
            .submit_batch(&json!({}), "http://localhost/match", &sink)
            .unwrap();
        assert!(features.is_empty());
        assert_eq!(transport.num_calls(), 3);
        assert!(sink.contains("Connection error (attempt 2/3)", Severity::Error));
        assert!(sink.contains("(attempt 3/3)", Severity::Info));
    }

    #[test]
    fn gives_up_after_the_last_attempt() {
        let transport = Scripted::new(vec![refused(), refused(), refused()]);
        let client = ApiClient::new(&transport, no_wait());

        match client.submit_batch(&json!({}), "http://localhost/match", &MemorySink::new()) {
            Err(Error::Connection { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("expected a connection error, got {:?}", other),
        }
        assert_eq!(transport.num_calls(), 3);
    }

    #[test]
    fn bad_status_is_not_retried() {
        let transport = Scripted::new(vec![Ok(HttpResponse {
            status: 400,
            body: "x".repeat(2000),
        })]);
        let client = ApiClient::new(&transport, no_wait());
        let sink = MemorySink::new();

        match client.submit_batch(&json!({}), "http://localhost/match", &sink) {
            Err(Error::HttpStatus { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), 500);
            }
            other => panic!("expected an HTTP status error, got {:?}", other),
        }
        assert_eq!(transport.num_calls(), 1);
        assert!(sink.contains("HTTP error: 400", Severity::Error));
    }

    #[test]
    fn only_4xx_and_5xx_are_errors() {
        for (status, is_error) in [
            (200, false),
            (204, false),
            (302, false),
            (399, false),
            (400, true),
            (503, true),
        ] {
            let resp = HttpResponse {
                status,
                body: String::new(),
            };
            assert_eq!(resp.is_error(), is_error, "status {}", status);
        }

        let transport = Scripted::new(vec![Ok(HttpResponse {
            status: 203,
            body: json!({"features": [{"type": "Feature"}]}).to_string(),
        })]);
        let client = ApiClient::new(&transport, no_wait());
        let features = client
            .submit_batch(&json!({}), "http://localhost/match", &MemorySink::new())
            .unwrap();
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn garbled_response_is_not_retried() {
        let transport = Scripted::new(vec![Ok(HttpResponse {
            status: 200,
            body: "<html>gateway</html>".to_string(),
        })]);
        let client = ApiClient::new(&transport, no_wait());

        assert!(matches!(
            client.submit_batch(&json!({}), "http://localhost/match", &MemorySink::new()),
            Err(Error::ResponseParse(_))
        ));
        assert_eq!(transport.num_calls(), 1);
    }

    #[test]
    fn other_transport_failures_are_not_retried() {
        let transport = Scripted::new(vec![Err(TransportError::Other(
            "builder error: relative URL without a base".to_string(),
        ))]);
        let client = ApiClient::new(&transport, no_wait());

        assert!(matches!(
            client.submit_batch(&json!({}), "match", &MemorySink::new()),
            Err(Error::Transport(_))
        ));
        assert_eq!(transport.num_calls(), 1);
    }

    // Accepts one connection, answers it, and hands back the raw request.
    fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!(
            "http://{}/v1/mapmatching?apiKey=secret",
            listener.local_addr().unwrap()
        );
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut payload = vec![0; content_length];
            reader.read_exact(&mut payload).unwrap();
            request.push_str(&String::from_utf8(payload).unwrap());

            let mut stream = stream;
            write!(
                stream,
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            request
        });
        (url, handle)
    }

    #[test]
    fn http_transport_posts_json() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"features": []}"#);
        let transport = HttpTransport::with_timeout(Duration::from_secs(10)).unwrap();

        let resp = transport
            .post_json(&url, br#"{"mode":"drive","waypoints":[]}"#)
            .unwrap();
        assert_eq!(
            resp,
            HttpResponse {
                status: 200,
                body: r#"{"features": []}"#.to_string(),
            }
        );

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1/mapmatching?apiKey=secret HTTP/1.1\r\n"));
        assert!(request
            .to_lowercase()
            .contains("\r\ncontent-type: application/json\r\n"));
        assert!(request.ends_with(r#"{"mode":"drive","waypoints":[]}"#));
    }

    #[test]
    fn http_transport_hands_back_error_statuses() {
        let (url, server) = serve_once("HTTP/1.1 401 Unauthorized", "Invalid apiKey");
        let transport = HttpTransport::with_timeout(Duration::from_secs(10)).unwrap();

        let resp = transport.post_json(&url, b"{}").unwrap();
        server.join().unwrap();
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, "Invalid apiKey");
        assert!(resp.is_error());
    }

    #[test]
    fn refused_connections_are_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!(
            "http://{}/v1/mapmatching?apiKey=secret",
            listener.local_addr().unwrap()
        );
        drop(listener);

        let transport = HttpTransport::with_timeout(Duration::from_secs(10)).unwrap();
        match transport.post_json(&url, b"{}") {
            Err(err @ TransportError::Connection(_)) => {
                assert!(err.is_retryable());
                assert!(!err.to_string().contains("secret"));
            }
            other => panic!("expected a connection error, got {:?}", other),
        }
    }

    #[test]
    fn timeouts_are_retryable() {
        // Bound but never accepted, so the request is never answered
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/match", listener.local_addr().unwrap());

        let transport = HttpTransport::with_timeout(Duration::from_millis(200)).unwrap();
        assert!(matches!(
            transport.post_json(&url, b"{}"),
            Err(TransportError::Connection(_))
        ));
        drop(listener);
    }
}
