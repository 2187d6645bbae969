//! traceherd-client: HTTP boundary to the trace provider.
//!
//! The provider answers two queries, both returning the same
//! [`SessionsResponse`] bundle: the full session set, or one session with its
//! trace tree. Everything analytical happens downstream in
//! `traceherd-engine`; this crate only fetches, deserializes and maps
//! provider failures onto the error taxonomy. No retries, no caching.

pub mod config;
pub mod error;

pub use config::{API_KEY_VAR, Config, DEFAULT_ENDPOINT, ENDPOINT_VAR, load_env_file};
pub use error::{Error, Result};

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;
use traceherd_types::SessionsResponse;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the trace provider API.
pub struct Client {
    http: reqwest::Client,
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Fetch the full session set with all events.
    pub async fn list_sessions(&self) -> Result<SessionsResponse> {
        self.fetch(&format!("{}/v1/sessions", self.config.endpoint))
            .await
    }

    /// Fetch one session with its trace tree.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionsResponse> {
        self.fetch(&format!(
            "{}/v1/sessions/{}/tree",
            self.config.endpoint, session_id
        ))
        .await
    }

    async fn fetch(&self, url: &str) -> Result<SessionsResponse> {
        debug!(url, "fetching session bundle");
        let response = self
            .http
            .post(url)
            .json(&json!({"api_key": self.config.api_key}))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let detail = error_detail(response).await;
        match status.as_u16() {
            401 => Err(Error::Authentication(
                detail.unwrap_or_else(|| "Authentication failed".to_string()),
            )),
            404 => Err(Error::SessionNotFound(
                detail.unwrap_or_else(|| "Not found".to_string()),
            )),
            code => Err(Error::Api {
                status: code,
                detail: detail.unwrap_or_else(|| format!("HTTP {}", code)),
            }),
        }
    }
}

/// The provider reports failures as `{"detail": "..."}`; anything else is
/// treated as an absent detail.
async fn error_detail(response: reqwest::Response) -> Option<String> {
    let body: Value = response.json().await.ok()?;
    body.get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
}
