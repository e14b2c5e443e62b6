//! The task dispatch contract.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a single dispatch attempt.
///
/// Recoverable trouble is carried here rather than in an `Err`: the
/// schedule layers read `ran`, `running` and `warnings` to decide whether
/// a task is owed another attempt.
#[derive(Debug, Clone, Default)]
pub struct TaskStatus {
    /// The task was successfully handed to the executor this call.
    pub ran: bool,

    /// Skipped because a previous instance is still active.
    pub running: bool,

    /// Permanent or unclassified failure, surfaced to the operator.
    pub error: Option<String>,

    /// Recoverable reasons (placement failures, skips); retry candidates.
    pub warnings: Vec<String>,

    /// Decorator-supplied metadata, e.g. retry attempt counters.
    pub info: Option<serde_json::Value>,

    /// Transport-supplied payload, e.g. the orchestrator response.
    pub output: Option<serde_json::Value>,
}

/// Executes a named task and reports what happened.
///
/// `Err` is reserved for transport-fatal conditions and aborts the current
/// tick; user-visible failures belong in the returned [`TaskStatus`].
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: &str) -> Result<TaskStatus>;
}

#[async_trait]
impl<R: TaskRunner + ?Sized> TaskRunner for Box<R> {
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        (**self).run_task(task).await
    }
}

/// Adapts a plain closure to [`TaskRunner`].
///
/// Used for tests, `--simulate`, and the dump recorder; anything that
/// needs a real transport implements the trait directly.
pub struct FnTaskRunner<F>(pub F);

#[async_trait]
impl<F> TaskRunner for FnTaskRunner<F>
where
    F: Fn(&str) -> Result<TaskStatus> + Send + Sync,
{
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        (self.0)(task)
    }
}
