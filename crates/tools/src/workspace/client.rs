//! HTTP client for the external document workspace.
//!
//! The workspace service answers every `POST /api/...` call with the same
//! envelope: `{ success, data, message, timestamp }`. One pooled client is
//! shared by all workspace tools and all sessions.

use std::time::Duration;

use chatloom_core::error::ToolError;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Response envelope returned by every workspace endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Clone)]
pub struct WorkspaceClient {
    base_url: String,
    client: reqwest::Client,
}

impl WorkspaceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}{path}` with a JSON body, decoded into the envelope.
    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiEnvelope, ToolError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Workspace request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Unavailable(format!("workspace timed out: {e}"))
                } else {
                    ToolError::Unavailable(format!("workspace unreachable: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Unavailable(format!("workspace response unreadable: {e}")))?;

        if !status.is_success() {
            // FastAPI-style errors carry {"detail": ...}
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("detail").map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string())))
                .unwrap_or(text);
            warn!(status = status.as_u16(), %detail, "Workspace returned error");
            return Err(ToolError::ExecutionFailed {
                tool_name: path.to_string(),
                reason: format!("HTTP {}: {detail}", status.as_u16()),
            });
        }

        serde_json::from_str(&text).map_err(|e| ToolError::ExecutionFailed {
            tool_name: path.to_string(),
            reason: format!("unexpected workspace response: {e}"),
        })
    }

    /// `GET /health`.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
