//! Error types for the backend service
//!
//! Application plumbing (config loading, startup) uses `anyhow` like the rest
//! of the service. The fetch pipeline returns [`FetchError`] so callers can
//! tell validation failures, transport failures, cancellation and sink
//! failures apart.

/// Result type alias for application plumbing
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for the fetch pipeline
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Message surfaced when a match function client cannot be constructed
pub const FAILED_TO_CONNECT: &str = "failed to connect to match function";

/// Message surfaced when the function reference names no supported transport
pub const UNSUPPORTED_FUNCTION_TYPE: &str = "provided match function type is not supported";

/// Coarse error classification used by outer surfaces (HTTP status, metrics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    Cancelled,
    DeadlineExceeded,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while fetching matches
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Malformed function reference or unusable client configuration
    #[error("{message}")]
    InvalidArgument { message: String },

    /// A single match function invocation failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The outbound sink rejected a match
    #[error(transparent)]
    Send(#[from] SendError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FetchError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        FetchError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Client construction failure, including missing trust material
    pub fn failed_to_connect() -> Self {
        Self::invalid_argument(FAILED_TO_CONNECT)
    }

    pub fn unsupported_function_type() -> Self {
        Self::invalid_argument(UNSUPPORTED_FUNCTION_TYPE)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FetchError::Internal {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            FetchError::Transport(_) => ErrorCode::Unavailable,
            FetchError::Cancelled => ErrorCode::Cancelled,
            FetchError::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            FetchError::Send(_) => ErrorCode::Unavailable,
            FetchError::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// True for the two context errors
    pub fn is_context_error(&self) -> bool {
        matches!(self, FetchError::Cancelled | FetchError::DeadlineExceeded)
    }
}

/// Failure of one match function invocation
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("match function request failed: {message}")]
    Request { message: String },

    #[error("match function returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode match function response: {message}")]
    Decode { message: String },

    /// Error reported by the match function itself
    #[error("match function error: {message}")]
    Remote { message: String },

    #[error("AMQP transport failed: {message}")]
    Amqp { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Request {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode {
            message: err.to_string(),
        }
    }
}

impl From<amqprs::error::Error> for TransportError {
    fn from(err: amqprs::error::Error) -> Self {
        TransportError::Amqp {
            message: err.to_string(),
        }
    }
}

/// Rejection from a [`crate::fetch::MatchSender`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to send match: {message}")]
pub struct SendError {
    pub message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
