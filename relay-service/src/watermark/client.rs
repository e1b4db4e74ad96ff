//! Watermarking service wire protocol and HTTP client.
//!
//! All variants talk to one endpoint:
//! - `POST <endpoint>` with a [`WatermarkPayload`]
//! - `GET <endpoint>/job-status/<id>` for asynchronous jobs
//! - `GET <download_url>` to fetch results

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{preview, RelayError};

// =============================================================================
// Wire Types
// =============================================================================

/// One document sent inline.
#[derive(Debug, Clone, Serialize)]
pub struct InlineFile {
    pub name: String,
    /// Base64-encoded document bytes
    pub content: String,
}

/// Request body for `POST <endpoint>`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WatermarkPayload {
    /// A single document already staged at a public URL.
    FileReference {
        user_id: String,
        attribution: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        logo_url: Option<String>,
        file_url: String,
    },
    /// One or more documents carried in the body.
    InlineFiles {
        user_id: String,
        attribution: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        logo_url: Option<String>,
        files: Vec<InlineFile>,
        #[serde(rename = "async")]
        async_job: bool,
    },
}

/// Response body for `POST <endpoint>`.
///
/// Synchronous calls fill `watermarked_file` or `file_url`; asynchronous
/// calls fill `job_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatermarkResponse {
    #[serde(default)]
    pub watermarked_file: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Lifecycle state of an asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Completed,
    Failed,
    /// Any status the service reports that we do not recognise.
    Other(String),
}

impl JobState {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "processing" => Self::Pending,
            "completed" | "complete" | "done" => Self::Completed,
            "failed" | "error" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Snapshot of an asynchronous watermarking job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkJob {
    pub id: String,
    pub state: JobState,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

/// A fetched result.
#[derive(Debug, Clone)]
pub struct Download {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

// =============================================================================
// Client Seam
// =============================================================================

/// Transport to the watermarking service.
#[async_trait]
pub trait WatermarkApi: Send + Sync {
    async fn submit(&self, payload: &WatermarkPayload) -> Result<WatermarkResponse, RelayError>;

    async fn job_status(&self, job_id: &str) -> Result<WatermarkJob, RelayError>;

    async fn download(&self, url: &str) -> Result<Download, RelayError>;
}

/// `reqwest` implementation of [`WatermarkApi`].
#[derive(Clone)]
pub struct HttpWatermarkApi {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpWatermarkApi {
    pub fn new(client: Client, endpoint: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Turn a non-2xx response into `WatermarkService` with the upstream body.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<reqwest::Response, RelayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(
            operation = operation,
            status_code = status.as_u16(),
            body = %preview(&body),
            "watermark_service_error_status"
        );
        Err(RelayError::WatermarkService {
            status: Some(status.as_u16()),
            body: preview(&body),
        })
    }
}

#[async_trait]
impl WatermarkApi for HttpWatermarkApi {
    async fn submit(&self, payload: &WatermarkPayload) -> Result<WatermarkResponse, RelayError> {
        let request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(payload);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(RelayError::watermark_transport)?;
        let status = response.status().as_u16();
        let response = Self::ensure_success(response, "submit").await?;

        let parsed: WatermarkResponse = response
            .json()
            .await
            .map_err(RelayError::watermark_transport)?;

        if let Some(message) = parsed.error.as_deref().filter(|m| !m.is_empty()) {
            return Err(RelayError::WatermarkService {
                status: Some(status),
                body: message.to_string(),
            });
        }

        info!(
            status_code = status,
            has_file = parsed.watermarked_file.is_some(),
            has_file_url = parsed.file_url.is_some(),
            job_id = ?parsed.job_id,
            "watermark_submit_accepted"
        );

        Ok(parsed)
    }

    async fn job_status(&self, job_id: &str) -> Result<WatermarkJob, RelayError> {
        let url = format!("{}/job-status/{}", self.endpoint, job_id);
        let request = self.client.get(url).timeout(self.timeout);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(RelayError::watermark_transport)?;
        let response = Self::ensure_success(response, "job_status").await?;

        let parsed: JobStatusResponse = response
            .json()
            .await
            .map_err(RelayError::watermark_transport)?;

        Ok(WatermarkJob {
            id: job_id.to_string(),
            state: JobState::parse(&parsed.status),
            result_url: parsed.download_url,
            error_message: parsed.error_message,
        })
    }

    async fn download(&self, url: &str) -> Result<Download, RelayError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(RelayError::watermark_transport)?;
        let response = Self::ensure_success(response, "download").await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(RelayError::watermark_transport)?
            .to_vec();

        info!(
            content_type = ?content_type,
            size_bytes = bytes.len(),
            "watermark_result_downloaded"
        );

        Ok(Download {
            content_type,
            bytes,
        })
    }
}
