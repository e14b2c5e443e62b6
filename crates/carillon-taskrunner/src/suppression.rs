//! Suppression of individual task dispatches.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::runner::{TaskRunner, TaskStatus};

/// Skips named tasks instead of delegating them.
///
/// The retry layer installs a fresh one of these every tick, so a task it
/// has already re-dispatched is not fired a second time by the schedule
/// underneath. Suppressions live as long as the decorator does.
pub struct SuppressionTaskRunner<'a> {
    runner: &'a dyn TaskRunner,
    tasks: HashMap<String, Option<String>>,
}

impl<'a> SuppressionTaskRunner<'a> {
    pub fn new(runner: &'a dyn TaskRunner) -> Self {
        Self {
            runner,
            tasks: HashMap::new(),
        }
    }

    /// Suppress `task`. A `None` reason skips silently; otherwise the
    /// reason is surfaced as a warning on the skipped status.
    pub fn suppress(&mut self, task: impl Into<String>, reason: Option<String>) {
        self.tasks.insert(task.into(), reason);
    }
}

#[async_trait]
impl<'a> TaskRunner for SuppressionTaskRunner<'a> {
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        match self.tasks.get(task) {
            None => self.runner.run_task(task).await,
            Some(reason) => Ok(TaskStatus {
                warnings: reason.clone().into_iter().collect(),
                ..TaskStatus::default()
            }),
        }
    }
}
