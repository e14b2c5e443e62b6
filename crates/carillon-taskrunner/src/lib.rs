//! Carillon task runners.
//!
//! The dispatch side of the carillon cron daemon: the [`TaskRunner`]
//! contract, the decorators the schedule layer composes around it, and a
//! concrete runner backed by a container orchestrator's task API.
//!
//! A runner executes a task *by name* and reports the outcome in a
//! [`TaskStatus`]; errors proper are reserved for dead transports.
//! Decorators are plain value wrappers over the runner they decorate:
//!
//! - [`SuppressionTaskRunner`] skips named tasks with an optional reason,
//! - [`TweakTaskRunner`] rewrites task names before dispatch,
//! - [`SkipRunningTaskRunner`] skips tasks whose previous instance is still
//!   running, matched by their started-by fingerprint.

pub mod error;
pub mod http;
pub mod orchestrator;
pub mod runner;
pub mod suppression;
pub mod tweak;

pub use error::{Result, RunnerError};
pub use http::HttpOrchestratorClient;
pub use orchestrator::{
    started_by_token, ListTasks, ListTasksInput, ListTasksOutput, OrchestratorTaskRunner,
    RunTaskInput, RunTaskOutput, RunTasks, SkipRunningTaskRunner, StartedTask, TaskFailure,
};
pub use runner::{FnTaskRunner, TaskRunner, TaskStatus};
pub use suppression::SuppressionTaskRunner;
pub use tweak::TweakTaskRunner;
