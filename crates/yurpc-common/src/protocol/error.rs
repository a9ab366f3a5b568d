use thiserror::Error;

#[derive(Error, Debug)]
pub enum YurpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::net::AddrParseError> for YurpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        YurpcError::InvalidRequest(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for YurpcError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        YurpcError::Timeout(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, YurpcError>;
