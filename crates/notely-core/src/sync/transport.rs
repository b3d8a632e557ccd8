//! HTTP transport between the sync orchestrator and the merge server.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::protocol::{SyncRequest, SyncResponse};
use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Bearer credential identifying the signed-in user
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token. Blank tokens are refused.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        normalize_text_option(Some(token.into()))
            .map(Self)
            .ok_or_else(|| Error::InvalidInput("Session token must not be empty".to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_tuple("SessionToken")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Request/response channel to the merge server
#[async_trait]
pub trait NoteTransport: Send + Sync {
    /// Send a batch of claims and receive the user's canonical note set
    async fn push(&self, session: &SessionToken, request: &SyncRequest) -> Result<SyncResponse>;

    /// Read the user's canonical note set without writing anything
    async fn fetch_all(&self, session: &SessionToken) -> Result<SyncResponse>;
}

/// `NoteTransport` over HTTP with JSON bodies
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn sync_url(&self) -> String {
        format!("{}/api/notes/sync", self.base_url)
    }

    fn list_url(&self) -> String {
        format!("{}/api/notes", self.base_url)
    }
}

#[async_trait]
impl NoteTransport for HttpTransport {
    async fn push(&self, session: &SessionToken, request: &SyncRequest) -> Result<SyncResponse> {
        let response = self
            .client
            .post(self.sync_url())
            .bearer_auth(session.expose())
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        read_notes(response).await
    }

    async fn fetch_all(&self, session: &SessionToken) -> Result<SyncResponse> {
        let response = self
            .client
            .get(self.list_url())
            .bearer_auth(session.expose())
            .header("Accept", "application/json")
            .send()
            .await?;

        read_notes(response).await
    }
}

async fn read_notes(response: reqwest::Response) -> Result<SyncResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        });
    }

    Ok(response.json::<SyncResponse>().await?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("Server URL must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "Server URL must include http:// or https://".to_string(),
        ))
    }
}
