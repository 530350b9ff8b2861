//! Errors shared by every Batchgrid crate.

use thiserror::Error;

/// Result type alias for core validation and config operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid target state for {id}: {reason}")]
    InvalidTarget { id: String, reason: String },

    #[error("invalid node info for {id}: {reason}")]
    InvalidNode { id: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}
