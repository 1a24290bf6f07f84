//! HTTP client for upstream package registries.

use crate::error::ToolError;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body echoed back to the client.
const MAX_ERROR_EXCERPT: usize = 200;

/// Shared, cheaply cloneable registry client.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    inner: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { inner })
    }

    /// GET `url` and decode a JSON body. `subject` names the package in
    /// not-found errors.
    pub async fn get_json(&self, url: &str, subject: &str) -> Result<Value, ToolError> {
        self.get_json_with_query(url, &[], subject).await
    }

    pub async fn get_json_with_query(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<Value, ToolError> {
        debug!(url = %url, "upstream request");
        let response = self
            .inner
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| ToolError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, subject, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))
    }
}

/// Map a non-success upstream status to a tool error.
pub(crate) fn status_error(status: StatusCode, subject: &str, body: &str) -> ToolError {
    match status {
        StatusCode::NOT_FOUND => ToolError::NotFound(subject.to_string()),
        StatusCode::TOO_MANY_REQUESTS => {
            ToolError::RateLimited("try again later".to_string())
        }
        other => ToolError::Upstream {
            status: other.as_u16(),
            message: excerpt(body),
        },
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_EXCERPT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None if trimmed.is_empty() => "no response body".to_string(),
        None => trimmed.to_string(),
    }
}
