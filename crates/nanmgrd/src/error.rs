//! Error types for nanmgrd

use thiserror::Error;

/// NAN manager daemon errors
#[derive(Error, Debug)]
pub enum NanmgrError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request line could not be parsed
    #[error("Script error at line {line}: {message}")]
    Script { line: usize, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NanmgrError {
    pub fn script(line: usize, message: impl Into<String>) -> Self {
        Self::Script {
            line,
            message: message.into(),
        }
    }
}

/// Result type for nanmgrd operations
pub type Result<T> = std::result::Result<T, NanmgrError>;
