use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::models::MachineInfo;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("machine {0} not found")]
    NotFound(String),
    #[error("control plane returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// Read-only view of the hosting provider's machine inventory.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn describe_machine(&self, machine_id: &str) -> Result<MachineInfo, ControlPlaneError>;
}

/// Talks to a management API exposing `GET {endpoint}/machines/{id}`.
pub struct HttpControlPlane {
    client: Client,
    endpoint: String,
}

impl HttpControlPlane {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn describe_machine(&self, machine_id: &str) -> Result<MachineInfo, ControlPlaneError> {
        let url = format!("{}/machines/{}", self.endpoint, machine_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ControlPlaneError::NotFound(machine_id.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(ControlPlaneError::Status { status, body });
        }

        Ok(response.json::<MachineInfo>().await?)
    }
}
