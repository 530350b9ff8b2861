//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur while refreshing state or dispatching work.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("dispatch to {node} failed: {reason}")]
    Dispatch { node: String, reason: String },

    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    Record(#[from] batchgrid_core::CoreError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
