//! Error types and handling
//!
//! Two families live here:
//! - [`HttpError`]: setup and transport errors returned as `Result`.
//! - [`RequestError`]: failures recorded on the sticky [`Chain`](crate::chain::Chain)
//!   while a request is being built or executed.

use thiserror::Error;

/// Setup and transport errors
#[derive(Error, Debug)]
pub enum HttpError {
    /// Required collaborator missing when creating a request
    #[error("Setup error: {0}")]
    Setup(String),

    /// Connection failed (DNS, TCP, TLS)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Invalid request configuration
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response parsing error
    #[error("Response error: {0}")]
    ResponseError(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic reqwest error
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket protocol or handshake transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    /// Missing collaborators at construction
    Setup,
    /// Connection-related errors (DNS, TCP, TLS)
    Connection,
    /// Timeout errors
    Timeout,
    /// Invalid request construction
    Request,
    /// Response parsing or status errors
    Response,
    /// Redirect errors
    Redirect,
    /// Unknown/other errors
    Unknown,
}

impl HttpError {
    /// Categorize the error for reporting
    pub fn category(&self) -> HttpErrorCategory {
        match self {
            HttpError::Setup(_) => HttpErrorCategory::Setup,
            HttpError::Connection(_) => HttpErrorCategory::Connection,
            HttpError::Timeout(_) => HttpErrorCategory::Timeout,
            HttpError::InvalidRequest(_) | HttpError::InvalidUrl(_) => HttpErrorCategory::Request,
            HttpError::ResponseError(_) | HttpError::Json(_) => HttpErrorCategory::Response,
            HttpError::Reqwest(e) => {
                if e.is_connect() {
                    HttpErrorCategory::Connection
                } else if e.is_timeout() {
                    HttpErrorCategory::Timeout
                } else if e.is_redirect() {
                    HttpErrorCategory::Redirect
                } else if e.is_request() {
                    HttpErrorCategory::Request
                } else {
                    HttpErrorCategory::Unknown
                }
            }
            HttpError::UrlParse(_) => HttpErrorCategory::Request,
            HttpError::WebSocket(e) => {
                use tokio_tungstenite::tungstenite::Error as WsError;
                match e {
                    WsError::Io(_) | WsError::Tls(_) => HttpErrorCategory::Connection,
                    WsError::Url(_) | WsError::HttpFormat(_) => HttpErrorCategory::Request,
                    _ => HttpErrorCategory::Unknown,
                }
            }
        }
    }

    /// Sanitize error message (remove sensitive info like credentials, internal IPs)
    pub fn sanitized_message(&self) -> String {
        let msg = self.to_string();
        sanitize_error_message(&msg)
    }
}

/// Failures recorded on the sticky chain.
///
/// Messages name the call (setter label) that caused them so a failing test
/// points straight at the offending builder step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("unexpected nil argument for url path format string:\n {call}")]
    NilPathArgument { call: String },

    #[error("unexpected key for url path format string:\n with_path({key:?}, {value})\n\npath:\n {path:?}")]
    UnknownPathKey {
        key: String,
        value: String,
        path: String,
    },

    #[error("malformed url path template {template:?}: {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("{call}: {reason}")]
    Encoding { call: &'static str, reason: String },

    #[error("ambiguous request body contents:\n  set by {previous}\n  overwritten by {next}")]
    BodyConflict {
        previous: &'static str,
        next: &'static str,
    },

    #[error(
        "ambiguous request \"Content-Type\" header values:\n {previous:?} (set by {previous_setter})\n\nand:\n {wanted:?} (wanted by {wanted_setter})"
    )]
    ContentTypeConflict {
        previous: String,
        previous_setter: &'static str,
        wanted: String,
        wanted_setter: &'static str,
    },

    #[error("{call} requires with_multipart to be called first")]
    MultipartRequired { call: &'static str },

    #[error("unexpected protocol version {0:?}, expected \"HTTP/{{major}}.{{minor}}\"")]
    InvalidProtocol(String),

    #[error("chunked Transfer-Encoding requires at least \"HTTP/1.1\", but {0:?} is enabled")]
    ChunkedRequiresHttp11(String),

    #[error("websocket request can not have body:\n  body set by {setter}\n  websocket enabled by with_websocket_upgrade")]
    WebsocketWithBody { setter: &'static str },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{message}")]
    Transport {
        category: HttpErrorCategory,
        message: String,
    },
}

impl RequestError {
    /// Category of a transport failure, `None` for builder misuse
    pub fn category(&self) -> Option<HttpErrorCategory> {
        match self {
            RequestError::Transport { category, .. } => Some(*category),
            _ => None,
        }
    }
}

impl From<HttpError> for RequestError {
    fn from(err: HttpError) -> Self {
        RequestError::Transport {
            category: err.category(),
            message: err.sanitized_message(),
        }
    }
}

/// Sanitize error messages by removing sensitive information
fn sanitize_error_message(msg: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static URL_CREDS_RE: OnceLock<Regex> = OnceLock::new();
    static INTERNAL_IP_RE: OnceLock<Regex> = OnceLock::new();
    static AUTH_HEADER_RE: OnceLock<Regex> = OnceLock::new();

    let url_creds_re = URL_CREDS_RE
        .get_or_init(|| Regex::new(r"(https?|wss?)://[^@:/\s]+:[^@\s]+@").expect("valid regex"));
    let internal_ip_re = INTERNAL_IP_RE.get_or_init(|| {
        Regex::new(r"\b(10\.|172\.(1[6-9]|2[0-9]|3[01])\.|192\.168\.)\d+\.\d+\b")
            .expect("valid regex")
    });
    let auth_header_re = AUTH_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)(authorization:\s*(?:basic|bearer)|bearer|api[_-]?key|token)\s*[:=]?\s*\S+")
            .expect("valid regex")
    });

    let sanitized = url_creds_re.replace_all(msg, "$1://[REDACTED]@");
    let sanitized = internal_ip_re.replace_all(&sanitized, "[INTERNAL_IP]");
    let sanitized = auth_header_re.replace_all(&sanitized, "$1: [REDACTED]");

    sanitized.to_string()
}
