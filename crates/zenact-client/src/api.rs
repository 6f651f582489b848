use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use zenact_types::Task;
use zenact_wire::{ApiErrorBody, CreateTaskRequest, CreateTaskResponse, HealthResponse};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// The two REST operations the session controller depends on.
#[async_trait]
pub trait TaskBackend: Send + Sync + 'static {
    async fn create_task(&self, prompt: &str) -> Result<CreateTaskResponse>;
    async fn get_task(&self, task_id: &str) -> Result<Task>;
}

#[derive(Clone)]
pub struct TaskApiClient {
    config: ClientConfig,
    client: Client,
}

impl TaskApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.http_timeout)
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn check_health(&self) -> Result<bool> {
        let response = self.client.get(self.config.health_url()).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: HealthResponse = handle_response(response).await?;
        Ok(body.status == "ok")
    }
}

#[async_trait]
impl TaskBackend for TaskApiClient {
    async fn create_task(&self, prompt: &str) -> Result<CreateTaskResponse> {
        let url = self.config.create_task_url();
        debug!("Creating task at: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&CreateTaskRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?;

        handle_response(response).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task> {
        let url = self.config.task_url(task_id)?;
        let response = self.client.get(&url).send().await?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse response from {}: {}", url, e);
            ClientError::Serialization(e)
        });
    }

    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .map(|b| b.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "Request failed: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });
    debug!("Request to {} failed ({}): {}", url, status, message);
    Err(ClientError::Request {
        status: status.as_u16(),
        message,
    })
}
