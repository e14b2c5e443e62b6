//! Error types for task runners.

use thiserror::Error;

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Transport-fatal runner failures.
///
/// Anything recoverable rides inside [`TaskStatus`](crate::TaskStatus);
/// a `RunnerError` aborts the tick that produced it.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// HTTP transport error.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The still-running probe failed.
    #[error("failed to list tasks for '{task}' on cluster '{cluster}': {message}")]
    ListTasks {
        task: String,
        cluster: String,
        message: String,
    },

    /// Other transport-fatal error.
    #[error("{0}")]
    Other(String),
}
