//! Asynchronous batch watermarking with job polling.
//!
//! ```text
//! submit(all files) → job_id → poll job-status every interval
//!   completed → download → archive bytes (or wrap single PDF)
//!   failed    → WatermarkJobFailed
//!   exhausted → WatermarkJobTimeout
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::archive::is_archive;
use super::client::{InlineFile, JobState, WatermarkApi, WatermarkPayload};
use super::{ProcessedAttachment, WatermarkOutput, WatermarkRequest, Watermarker};
use crate::error::RelayError;
use crate::inbound::is_document;

/// Fixed-delay polling budget.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 15,
        }
    }
}

pub struct BatchWatermarker {
    api: Arc<dyn WatermarkApi>,
    poll: PollPolicy,
}

impl BatchWatermarker {
    pub fn new(api: Arc<dyn WatermarkApi>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    /// Poll until the job reaches a terminal state; returns the result URL.
    async fn await_job(&self, tenant_id: &str, job_id: &str) -> Result<String, RelayError> {
        for attempt in 1..=self.poll.max_attempts {
            sleep(self.poll.interval).await;

            let job = match self.api.job_status(job_id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(
                        tenant_id = %tenant_id,
                        job_id = %job_id,
                        attempt = attempt,
                        error = %e,
                        "watermark_job_poll_error"
                    );
                    continue;
                }
            };

            info!(
                tenant_id = %tenant_id,
                job_id = %job_id,
                attempt = attempt,
                state = ?job.state,
                "watermark_job_poll"
            );

            match job.state {
                JobState::Completed => {
                    return job.result_url.filter(|u| !u.is_empty()).ok_or_else(|| {
                        error!(tenant_id = %tenant_id, job_id = %job_id, "watermark_job_no_result");
                        RelayError::WatermarkService {
                            status: None,
                            body: format!("job {job_id} completed without a download_url"),
                        }
                    });
                }
                JobState::Failed => {
                    let message = job
                        .error_message
                        .unwrap_or_else(|| "no error message reported".to_string());
                    error!(
                        tenant_id = %tenant_id,
                        job_id = %job_id,
                        attempt = attempt,
                        message = %message,
                        "watermark_job_failed"
                    );
                    return Err(RelayError::WatermarkJobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                JobState::Pending | JobState::Other(_) => {}
            }
        }

        error!(
            tenant_id = %tenant_id,
            job_id = %job_id,
            attempts = self.poll.max_attempts,
            "watermark_job_timeout"
        );
        Err(RelayError::WatermarkJobTimeout {
            job_id: job_id.to_string(),
            attempts: self.poll.max_attempts,
        })
    }
}

/// Name for a single-document result: the URL's file name if it is a PDF,
/// otherwise derived from the first input.
fn single_result_name(url: &str, request: &WatermarkRequest) -> String {
    let from_url = url::Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
    });

    match from_url {
        Some(name) if is_document(&name) => name,
        _ => request
            .files
            .first()
            .map(|f| format!("watermarked_{}", f.file_name))
            .unwrap_or_else(|| "watermarked.pdf".to_string()),
    }
}

#[async_trait]
impl Watermarker for BatchWatermarker {
    fn variant(&self) -> &'static str {
        "batch"
    }

    async fn submit(&self, request: WatermarkRequest) -> Result<WatermarkOutput, RelayError> {
        let payload = WatermarkPayload::InlineFiles {
            user_id: request.user_id.clone(),
            attribution: request.attribution.clone(),
            logo_url: request.logo_url.clone(),
            files: request
                .files
                .iter()
                .map(|f| InlineFile {
                    name: f.file_name.clone(),
                    content: STANDARD.encode(&f.content),
                })
                .collect(),
            async_job: true,
        };

        info!(
            tenant_id = %request.tenant_id,
            files = request.files.len(),
            "watermark_batch_submit"
        );

        let response = self.api.submit(&payload).await.map_err(|e| {
            error!(
                tenant_id = %request.tenant_id,
                error = %e,
                "watermark_batch_submit_failed"
            );
            e
        })?;

        let job_id = response.job_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            error!(tenant_id = %request.tenant_id, "watermark_batch_no_job_id");
            RelayError::WatermarkService {
                status: None,
                body: "asynchronous submit returned no job_id".to_string(),
            }
        })?;

        info!(tenant_id = %request.tenant_id, job_id = %job_id, "watermark_job_created");

        let result_url = self.await_job(&request.tenant_id, &job_id).await?;
        let download = self.api.download(&result_url).await?;

        if is_archive(download.content_type.as_deref(), &download.bytes) {
            info!(
                tenant_id = %request.tenant_id,
                job_id = %job_id,
                size_bytes = download.bytes.len(),
                "watermark_batch_archive_result"
            );
            return Ok(WatermarkOutput::Archive(download.bytes));
        }

        if download.bytes.is_empty() {
            return Err(RelayError::AllWatermarksFailed {
                attempted: request.files.len(),
            });
        }

        Ok(WatermarkOutput::Documents(vec![ProcessedAttachment::document(
            single_result_name(&result_url, &request),
            download.bytes,
        )]))
    }
}
