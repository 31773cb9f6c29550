//! HTTP client for the simulation engine's control endpoints
//!
//! - `POST /api/start_simulation` with `{tag_count, interval, webhook_url}`
//! - `POST /api/stop_simulation` with no body
//!
//! Any 2xx is acceptance. Other statuses carry `{"detail": ...}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Body of the start request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub tag_count: u32,
    pub interval: f64,
    pub webhook_url: Option<String>,
}

/// How an engine call failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("engine rejected the request: {0}")]
    Rejected(String),
    #[error("engine unreachable: {0}")]
    Unreachable(String),
}

/// The two control operations the dashboard needs from the engine
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    async fn start_simulation(&self, request: &StartRequest) -> Result<(), EngineError>;
    async fn stop_simulation(&self) -> Result<(), EngineError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Extract the failure reason from a non-2xx response body
fn rejection_detail(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail: Some(serde_json::Value::String(detail)) }) if !detail.trim().is_empty() => detail,
        Ok(ErrorBody { detail: Some(serde_json::Value::String(_)) }) => fallback.to_string(),
        // e.g. validation error lists
        Ok(ErrorBody { detail: Some(detail) }) if !detail.is_null() => detail.to_string(),
        _ => fallback.to_string(),
    }
}

pub struct HttpEngine {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        path: &str,
        body: Option<&StartRequest>,
        fallback: &str,
    ) -> Result<(), EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let mut request = self.client.post(&url).header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    url = %url,
                    latency_us = %start.elapsed().as_micros(),
                    timeout = e.is_timeout(),
                    error = %e,
                    "engine_request_failed"
                );
                return Err(EngineError::Unreachable(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            info!(url = %url, status = %status.as_u16(), latency_us = %start.elapsed().as_micros(), "engine_request_ok");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let detail = rejection_detail(&text, fallback);
        warn!(url = %url, status = %status.as_u16(), detail = %detail, "engine_request_rejected");
        Err(EngineError::Rejected(detail))
    }
}

#[async_trait]
impl SimulationEngine for HttpEngine {
    async fn start_simulation(&self, request: &StartRequest) -> Result<(), EngineError> {
        self.post("/api/start_simulation", Some(request), "Failed to start simulation").await
    }

    async fn stop_simulation(&self) -> Result<(), EngineError> {
        self.post("/api/stop_simulation", None, "Failed to stop simulation").await
    }
}
