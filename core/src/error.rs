//! Error types for request execution.
//!
//! # Design
//! `NetError` is the closed set of outcomes a caller can observe for a failed
//! call. Transport failures and non-2xx statuses are always classified into
//! one of these before delivery, so every completion style reports the same
//! kinds. `TransportError` is what a `Transport` reports when no response
//! was obtained; it becomes the `source` of the classified error.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed underlying cause of a domain error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failures reported by a transport before any response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The task was told to stop.
    #[error("request cancelled")]
    Cancelled,

    /// The per-request timeout elapsed.
    #[error("request timed out: {0}")]
    TimedOut(String),

    /// Connection, DNS, or TLS handshake failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built or sent.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = error_chain(&e);
        if e.is_timeout() {
            TransportError::TimedOut(message)
        } else if e.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Other(message)
        }
    }
}

/// `reqwest` hides TLS and I/O details in the source chain; flatten it.
fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Discriminant of a `NetError`, convenient for comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Prohibited,
    NotFound,
    DecodingFailed,
    Timeout,
    ServerError,
    Cancelled,
    RequestFailed,
    Unknown,
}

impl ErrorKind {
    /// Stable numeric code exposed across boundaries.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Prohibited => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::DecodingFailed => 422,
            ErrorKind::Timeout => 408,
            ErrorKind::ServerError => 500,
            ErrorKind::Cancelled => -999,
            ErrorKind::RequestFailed => 1000,
            ErrorKind::Unknown => 1002,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BadRequest => "badRequest",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Prohibited => "prohibited",
            ErrorKind::NotFound => "notFound",
            ErrorKind::DecodingFailed => "decodingFailed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "serverError",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RequestFailed => "requestFailed",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified request failure.
#[derive(Debug, Error)]
pub enum NetError {
    /// The server returned 400.
    #[error("bad request")]
    BadRequest {
        #[source]
        source: Option<BoxError>,
    },

    /// The server returned 401.
    #[error("unauthorized")]
    Unauthorized {
        #[source]
        source: Option<BoxError>,
    },

    /// The server returned 403. `message` is the server-supplied text.
    #[error("prohibited: {message}")]
    Prohibited { message: String, body: Vec<u8> },

    /// The server returned 404.
    #[error("not found")]
    NotFound {
        #[source]
        source: Option<BoxError>,
    },

    /// The server returned 422, or a success body did not match the
    /// requested type.
    #[error("decoding failed")]
    DecodingFailed {
        /// Set when the server itself answered 422.
        status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// The server returned 408, or the transport timeout elapsed.
    #[error("request timed out")]
    Timeout {
        /// Set when the server itself answered 408.
        status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// The server returned a 5xx status.
    #[error("server error (status {status})")]
    ServerError {
        status: u16,
        #[source]
        source: Option<BoxError>,
    },

    /// The request was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The request failed without a more specific classification.
    #[error("request failed")]
    RequestFailed {
        status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// Neither a response nor a transport error was available.
    #[error("unknown error")]
    Unknown {
        #[source]
        source: Option<BoxError>,
    },
}

impl NetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::BadRequest { .. } => ErrorKind::BadRequest,
            NetError::Unauthorized { .. } => ErrorKind::Unauthorized,
            NetError::Prohibited { .. } => ErrorKind::Prohibited,
            NetError::NotFound { .. } => ErrorKind::NotFound,
            NetError::DecodingFailed { .. } => ErrorKind::DecodingFailed,
            NetError::Timeout { .. } => ErrorKind::Timeout,
            NetError::ServerError { .. } => ErrorKind::ServerError,
            NetError::Cancelled => ErrorKind::Cancelled,
            NetError::RequestFailed { .. } => ErrorKind::RequestFailed,
            NetError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    /// HTTP status that produced this error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            NetError::BadRequest { .. } => Some(400),
            NetError::Unauthorized { .. } => Some(401),
            NetError::Prohibited { .. } => Some(403),
            NetError::NotFound { .. } => Some(404),
            NetError::DecodingFailed { status, .. } => *status,
            NetError::Timeout { status, .. } => *status,
            NetError::ServerError { status, .. } => Some(*status),
            NetError::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn decoding(cause: impl Into<BoxError>) -> Self {
        NetError::DecodingFailed {
            status: None,
            source: Some(cause.into()),
        }
    }
}
