//! Dispatch onto a container orchestrator's task API.
//!
//! The orchestrator is reached through two narrow seams, [`RunTasks`] and
//! [`ListTasks`], so the runners here never depend on a concrete
//! transport. [`HttpOrchestratorClient`](crate::HttpOrchestratorClient)
//! implements both; tests substitute closures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};
use crate::runner::{TaskRunner, TaskStatus};

/// Request to start one instance of a task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTaskInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub task_definition: String,
    pub started_by: String,
}

/// A task instance the orchestrator reports as started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedTask {
    pub task_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_instance_arn: Option<String>,
}

/// A placement failure reported alongside (not instead of) a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTaskOutput {
    #[serde(default)]
    pub tasks: Vec<StartedTask>,
    #[serde(default)]
    pub failures: Vec<TaskFailure>,
}

/// Query for instances carrying a given started-by token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub started_by: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksOutput {
    #[serde(default)]
    pub task_arns: Vec<String>,
}

/// Starts tasks.
#[async_trait]
pub trait RunTasks: Send + Sync {
    async fn run_task(&self, input: &RunTaskInput) -> Result<RunTaskOutput>;
}

/// Lists running task instances by their started-by token.
#[async_trait]
pub trait ListTasks: Send + Sync {
    async fn list_tasks(&self, input: &ListTasksInput) -> Result<ListTasksOutput>;
}

/// Stable fingerprint attached to every started instance.
///
/// The same token is used when probing for running instances, so a probe
/// always sees what an earlier dispatch started. Lowercase hex, 32 chars.
pub fn started_by_token(task: &str) -> String {
    format!("{:x}", md5::compute(task))
}

/// Runs crontab tasks as orchestrator tasks, one task definition per name.
pub struct OrchestratorTaskRunner<S> {
    service: S,
    cluster: Option<String>,
}

impl<S: RunTasks> OrchestratorTaskRunner<S> {
    pub fn new(service: S, cluster: Option<String>) -> Self {
        Self { service, cluster }
    }
}

#[async_trait]
impl<S: RunTasks> TaskRunner for OrchestratorTaskRunner<S> {
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        let input = RunTaskInput {
            cluster: self.cluster.clone(),
            task_definition: task.to_string(),
            started_by: started_by_token(task),
        };

        // A failed start is a failed run, not a dead transport.
        let output = match self.service.run_task(&input).await {
            Err(err) => {
                return Ok(TaskStatus {
                    error: Some(err.to_string()),
                    ..TaskStatus::default()
                })
            }
            Ok(output) => output,
        };

        if !output.failures.is_empty() {
            let warnings = output
                .failures
                .iter()
                .map(|failure| {
                    format!(
                        "failure during run of '{}' on cluster '{}': {}",
                        task,
                        self.cluster.as_deref().unwrap_or_default(),
                        failure.reason.replace('\n', " ")
                    )
                })
                .collect();

            return Ok(TaskStatus {
                warnings,
                output: serde_json::to_value(&output).ok(),
                ..TaskStatus::default()
            });
        }

        Ok(TaskStatus {
            ran: true,
            output: serde_json::to_value(&output).ok(),
            ..TaskStatus::default()
        })
    }
}

/// Probes for a still-running instance before delegating.
pub struct SkipRunningTaskRunner<S, R> {
    service: S,
    cluster: Option<String>,
    runner: R,
}

impl<S: ListTasks, R: TaskRunner> SkipRunningTaskRunner<S, R> {
    pub fn new(service: S, cluster: Option<String>, runner: R) -> Self {
        Self {
            service,
            cluster,
            runner,
        }
    }
}

#[async_trait]
impl<S: ListTasks, R: TaskRunner> TaskRunner for SkipRunningTaskRunner<S, R> {
    async fn run_task(&self, task: &str) -> Result<TaskStatus> {
        let input = ListTasksInput {
            cluster: self.cluster.clone(),
            started_by: started_by_token(task),
            max_results: 1,
        };

        // A failed probe is fatal; a dispatch must never go out blind.
        let listing =
            self.service
                .list_tasks(&input)
                .await
                .map_err(|err| RunnerError::ListTasks {
                    task: task.to_string(),
                    cluster: self.cluster.clone().unwrap_or_default(),
                    message: err.to_string(),
                })?;

        if !listing.task_arns.is_empty() {
            return Ok(TaskStatus {
                running: true,
                warnings: vec![format!(
                    "skipping task '{}', which is still running on cluster '{}'",
                    task,
                    self.cluster.as_deref().unwrap_or_default()
                )],
                ..TaskStatus::default()
            });
        }

        self.runner.run_task(task).await
    }
}
