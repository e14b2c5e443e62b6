//! Task-name rewriting.

use async_trait::async_trait;

use crate::error::Result;
use crate::runner::{TaskRunner, TaskStatus};

/// Rewrites the task name before delegating.
///
/// The daemon uses this to apply `--prefix`/`--suffix` so one crontab can
/// drive several deployments of the same task definitions.
pub struct TweakTaskRunner<R, F> {
    runner: R,
    translator: F,
}

impl<R, F> TweakTaskRunner<R, F>
where
    R: TaskRunner,
    F: Fn(&str) -> String + Send + Sync,
{
    pub fn new(runner: R, translator: F) -> Self {
        Self { runner, translator }
    }
}

#[async_trait]
impl<R, F> TaskRunner for TweakTaskRunner<R, F>
where
    R: TaskRunner,
    F: Fn(&str) -> String + Send + Sync,
{
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        self.runner.run_task(&(self.translator)(task)).await
    }
}
