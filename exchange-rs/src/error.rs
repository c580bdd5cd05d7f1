use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Client not authorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid storage format at line {line}: {reason}")]
    Format { line: usize, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown recipients: {}", .0.join(", "))]
    UnknownRecipients(Vec<String>),

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

impl From<::config::ConfigError> for ExchangeError {
    fn from(e: ::config::ConfigError) -> Self {
        ExchangeError::Config(e.to_string())
    }
}
