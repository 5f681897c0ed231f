//! Catalog backend client: timeout-bounded HTTP with typed status failures.
//!
//! The error split matters: a response with a non-2xx status produces
//! [`ApiError::Status`] carrying the numeric code, while DNS/connect/timeout
//! failures produce [`ApiError::Network`] with no code. Callers branch on
//! "has a status" to decide between retrying and surfacing an
//! authorization-specific message (401/403).

use crate::model::{CatalogLivery, Resolution, Simulator};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection timeout: time to establish the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout for metadata calls (catalog, URL resolution, updates).
const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-request timeout for file-content GETs.
///
/// Measured from request start, not per chunk: a slow-but-steady transfer
/// that exceeds this total is aborted even while bytes are still arriving.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure modes of a backend call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("server responded with {code}")]
    Status { code: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// The HTTP status code, if this failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            ApiError::Network(_) | ApiError::Io(_) => None,
        }
    }

    /// Whether this is an authorization rejection (stale/invalid token).
    /// Retrying with the same token cannot succeed; the session should be
    /// invalidated instead.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Signed download descriptor returned by a livery's download endpoint.
///
/// `download_url` is short-lived and must not be cached or reused across
/// pipeline invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDownload {
    pub download_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One `(liveryId, currentVersion)` pair submitted to the batch updates endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheck {
    pub livery_id: String,
    pub current_version: String,
}

/// One entry of the batch updates response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckEntry {
    pub livery_id: String,
    pub has_update: bool,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub changelog: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdatesRequest<'a> {
    liveries: &'a [VersionCheck],
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    updates: Vec<UpdateCheckEntry>,
}

#[derive(Debug, Serialize)]
struct TrackRequest {
    simulator: Simulator,
    resolution: Resolution,
}

/// Backend operations the install pipeline depends on.
///
/// Split out as a trait so the orchestrator can be driven headlessly in
/// tests (call-count assertions, stubbed signed URLs) without a live server.
#[async_trait]
pub trait LiveryApi: Send + Sync {
    /// Exchange a catalog download endpoint plus auth token for a signed URL.
    async fn resolve_download_url(&self, endpoint: &str, token: &str)
        -> Result<SignedDownload, ApiError>;

    /// Submit all `(liveryId, currentVersion)` pairs in one batch request.
    async fn check_updates(
        &self,
        token: &str,
        pairs: &[VersionCheck],
    ) -> Result<Vec<UpdateCheckEntry>, ApiError>;

    /// Report a completed install. Fire-and-forget on the caller side.
    async fn track_install(
        &self,
        livery_id: &str,
        simulator: Simulator,
        resolution: Resolution,
    ) -> Result<(), ApiError>;
}

/// Shared HTTP transport for both metadata calls and file downloads.
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("liveryhub/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Issue a file-content GET with the download timeout applied.
    /// Non-2xx responses become [`ApiError::Status`].
    pub async fn get_download(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let response = self.client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?;
        check_status(response).await
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Turn a non-2xx response into a typed status failure.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            code: status.as_u16(),
            body: truncate_error(&body),
        });
    }
    Ok(response)
}

/// Truncate an error body for display.
///
/// Counts characters, not bytes: server bodies are arbitrary UTF-8 and a
/// byte cut could land inside a multibyte sequence.
fn truncate_error(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        let cut: String = trimmed.chars().take(197).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}

/// Production [`LiveryApi`] implementation against the catalog backend.
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the full remote livery catalog.
    pub async fn fetch_catalog(&self, token: &str) -> Result<Vec<CatalogLivery>, ApiError> {
        let url = format!("{}/liveries", self.base_url);
        debug!("Fetching catalog from {}", url);

        let response = self
            .http
            .inner()
            .get(&url)
            .bearer_auth(token)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LiveryApi for ApiClient {
    async fn resolve_download_url(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<SignedDownload, ApiError> {
        debug!("Resolving signed URL via {}", endpoint);

        let response = self
            .http
            .inner()
            .get(endpoint)
            .bearer_auth(token)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json().await?)
    }

    async fn check_updates(
        &self,
        token: &str,
        pairs: &[VersionCheck],
    ) -> Result<Vec<UpdateCheckEntry>, ApiError> {
        let url = format!("{}/updates", self.base_url);
        debug!("Checking updates for {} liveries via {}", pairs.len(), url);

        let response = self
            .http
            .inner()
            .post(&url)
            .bearer_auth(token)
            .timeout(METADATA_TIMEOUT)
            .json(&UpdatesRequest { liveries: pairs })
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: UpdatesResponse = response.json().await?;
        Ok(parsed.updates)
    }

    async fn track_install(
        &self,
        livery_id: &str,
        simulator: Simulator,
        resolution: Resolution,
    ) -> Result<(), ApiError> {
        let url = format!("{}/liveries/{}/track", self.base_url, livery_id);

        let response = self
            .http
            .inner()
            .post(&url)
            .timeout(METADATA_TIMEOUT)
            .json(&TrackRequest { simulator, resolution })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
