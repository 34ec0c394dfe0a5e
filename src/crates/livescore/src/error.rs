//! Error types for the livescore client

use thiserror::Error;

/// Errors that can occur in the livescore client
///
/// Connection-level failures never surface through the manager's public
/// operations; they are recorded on the connection status instead. These
/// variants cover configuration loading, frame encoding and the transport
/// internals.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Transport error (connect refused, reset, write failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame that does not follow the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    /// Check if the error comes from the connection and may clear up on reconnect
    pub fn is_transient(&self) -> bool {
        matches!(self, LiveError::Transport(_))
    }
}

/// Result type for livescore operations
pub type Result<T> = std::result::Result<T, LiveError>;
