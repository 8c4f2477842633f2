use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the nirn global rate limiting core
#[derive(Debug)]
pub enum NirnError {
    /// Configuration or CLI argument errors
    Config(String),

    /// The bucket backend refused to build a bucket
    BucketStorage(String),

    /// Malformed request to one of our HTTP endpoints
    Api(String),

    /// Owning node answered a global grant request with something other than 200
    GlobalRequest(StatusCode),

    /// Transport failure talking to another node over HTTP
    Transport(reqwest::Error),

    /// Caller gave up on an in-flight remote grant
    Cancelled,

    /// Gossip membership errors
    Gossip(GossipError),

    /// No seed answered a join attempt
    Join(String),

    /// System I/O errors
    Io(std::io::Error),
}

/// Gossip membership specific errors
#[derive(Debug)]
pub enum GossipError {
    /// Could not bind the gossip socket
    Bind(std::io::Error),

    /// Encoding or decoding a gossip message failed
    Codec(String),

    /// Seed address resolution failed
    Resolve(String),
}

impl fmt::Display for NirnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NirnError::Config(msg) => write!(f, "Configuration error: {}", msg),
            NirnError::BucketStorage(msg) => write!(f, "Bucket storage error: {}", msg),
            NirnError::Api(msg) => write!(f, "API error: {}", msg),
            NirnError::GlobalRequest(status) => {
                write!(f, "global request failed with status {}", status)
            }
            NirnError::Transport(err) => write!(f, "Transport error: {}", err),
            NirnError::Cancelled => write!(f, "global request cancelled"),
            NirnError::Gossip(err) => write!(f, "Gossip error: {}", err),
            NirnError::Join(msg) => write!(f, "Cluster join error: {}", msg),
            NirnError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for GossipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossipError::Bind(err) => write!(f, "Bind: {}", err),
            GossipError::Codec(msg) => write!(f, "Codec: {}", msg),
            GossipError::Resolve(msg) => write!(f, "Resolve: {}", msg),
        }
    }
}

impl std::error::Error for NirnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NirnError::Transport(err) => Some(err),
            NirnError::Io(err) => Some(err),
            NirnError::Gossip(GossipError::Bind(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for GossipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GossipError::Bind(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, NirnError>;

impl NirnError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NirnError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NirnError::BucketStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NirnError::Api(_) => StatusCode::BAD_REQUEST,
            NirnError::GlobalRequest(_) => StatusCode::BAD_GATEWAY,
            NirnError::Transport(_) => StatusCode::BAD_GATEWAY,
            NirnError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            NirnError::Gossip(_) => StatusCode::SERVICE_UNAVAILABLE,
            NirnError::Join(_) => StatusCode::SERVICE_UNAVAILABLE,
            NirnError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            NirnError::Config(_) => "configuration_error",
            NirnError::BucketStorage(_) => "bucket_storage_error",
            NirnError::Api(_) => "api_error",
            NirnError::GlobalRequest(_) => "global_request_error",
            NirnError::Transport(_) => "transport_error",
            NirnError::Cancelled => "cancelled",
            NirnError::Gossip(_) => "gossip_error",
            NirnError::Join(_) => "join_error",
            NirnError::Io(_) => "io_error",
        }
    }
}

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for NirnError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

// Conversions from common error types
impl From<std::io::Error> for NirnError {
    fn from(err: std::io::Error) -> Self {
        NirnError::Io(err)
    }
}

impl From<reqwest::Error> for NirnError {
    fn from(err: reqwest::Error) -> Self {
        NirnError::Transport(err)
    }
}

impl From<GossipError> for NirnError {
    fn from(err: GossipError) -> Self {
        NirnError::Gossip(err)
    }
}

impl From<bincode::error::EncodeError> for NirnError {
    fn from(err: bincode::error::EncodeError) -> Self {
        NirnError::Gossip(GossipError::Codec(err.to_string()))
    }
}

impl From<bincode::error::DecodeError> for NirnError {
    fn from(err: bincode::error::DecodeError) -> Self {
        NirnError::Gossip(GossipError::Codec(err.to_string()))
    }
}

impl From<std::net::AddrParseError> for NirnError {
    fn from(err: std::net::AddrParseError) -> Self {
        NirnError::Config(format!("Invalid address: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::NirnError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::NirnError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! api_error {
    ($msg:expr) => {
        $crate::error::NirnError::Api($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::NirnError::Api(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr) => {
        $crate::error::NirnError::BucketStorage($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::NirnError::BucketStorage(format!($fmt, $($arg)*))
    };
}
