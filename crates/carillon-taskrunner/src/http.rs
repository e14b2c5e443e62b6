//! HTTP transport for the orchestrator task API.

use async_trait::async_trait;

use crate::error::Result;
use crate::orchestrator::{
    ListTasks, ListTasksInput, ListTasksOutput, RunTaskInput, RunTaskOutput, RunTasks,
};

/// JSON client for an orchestrator exposing `POST {base}/tasks/run` and
/// `POST {base}/tasks/list`.
#[derive(Debug, Clone)]
pub struct HttpOrchestratorClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOrchestratorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured client (timeouts, proxies, TLS).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }
}

#[async_trait]
impl RunTasks for HttpOrchestratorClient {
    async fn run_task(&self, input: &RunTaskInput) -> Result<RunTaskOutput> {
        let response = self
            .http
            .post(format!("{}/tasks/run", self.base_url))
            .json(input)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ListTasks for HttpOrchestratorClient {
    async fn list_tasks(&self, input: &ListTasksInput) -> Result<ListTasksOutput> {
        let response = self
            .http
            .post(format!("{}/tasks/list", self.base_url))
            .json(input)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}
