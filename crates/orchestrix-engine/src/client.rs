use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use orchestrix_common::{Error, Result};

/// Identifiers returned by the engine when a start request is accepted.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub engine_workflow_id: String,
    pub engine_run_id: String,
}

/// Driven port for the external workflow engine.
///
/// `request_id` is a stable caller-chosen identifier; the engine
/// deduplicates start requests by it.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn execute(&self, request_id: &str, entrypoint: &str, payload: Value)
        -> Result<EngineRun>;

    async fn cancel(&self, engine_workflow_id: &str) -> Result<()>;

    async fn describe(&self, engine_workflow_id: &str) -> Result<String>;
}

/// HTTP client for the engine's REST start/cancel/describe surface.
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
    task_queue: String,
}

#[derive(Deserialize)]
struct StartResponse {
    workflow_id: String,
    run_id: String,
}

#[derive(Deserialize)]
struct DescribeResponse {
    status: String,
}

impl HttpEngineClient {
    pub fn new(base_url: &str, task_queue: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Engine(format!("failed to build engine client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            task_queue: task_queue.to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Engine(format!(
            "engine returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn execute(
        &self,
        request_id: &str,
        entrypoint: &str,
        payload: Value,
    ) -> Result<EngineRun> {
        let response = self
            .client
            .post(format!("{}/api/v1/workflows/start", self.base_url))
            .json(&serde_json::json!({
                "workflow_id": request_id,
                "task_queue": self.task_queue,
                "workflow_type": entrypoint,
                "input": payload,
            }))
            .send()
            .await
            .map_err(|e| Error::Engine(format!("engine start request failed: {e}")))?;
        let response = Self::check(response).await?;
        let body: StartResponse = response
            .json()
            .await
            .map_err(|e| Error::Engine(format!("invalid engine start response: {e}")))?;
        Ok(EngineRun {
            engine_workflow_id: body.workflow_id,
            engine_run_id: body.run_id,
        })
    }

    async fn cancel(&self, engine_workflow_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/api/v1/workflows/{engine_workflow_id}/cancel",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| Error::Engine(format!("engine cancel request failed: {e}")))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn describe(&self, engine_workflow_id: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/api/v1/workflows/{engine_workflow_id}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| Error::Engine(format!("engine describe request failed: {e}")))?;
        let response = Self::check(response).await?;
        let body: DescribeResponse = response
            .json()
            .await
            .map_err(|e| Error::Engine(format!("invalid engine describe response: {e}")))?;
        Ok(body.status)
    }
}
