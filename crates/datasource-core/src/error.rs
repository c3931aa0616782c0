//! Error types for the DataSource layer
//!
//! Only [`Error::Config`] may abort adapter or registry initialization.
//! Everything else is scoped to a single send or callback.

use thiserror::Error;

/// Result type alias for DataSource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DataSource layer
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider HTTP failure; recovered inside `send` as a `Failed` outcome
    #[error("Transport error: {0}")]
    Transport(String),

    /// Callback secret mismatch
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed inbound payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown adapter, message or contact
    #[error("Not found: {0}")]
    NotFound(String),

    /// Message store failure
    #[error("Message store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a message store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// HTTP status an inbound callback should answer with for this error
    pub fn callback_status(&self) -> u16 {
        match self {
            Error::Authentication(_) => 401,
            Error::Validation(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
