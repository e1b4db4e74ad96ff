//! Error taxonomy for the relay pipeline.

use axum::http::StatusCode;
use thiserror::Error;

/// Every way a relay request can fail.
///
/// Per-attachment variants (`AttachmentDecode`, and `WatermarkService` when
/// raised for a single file in a synchronous variant) are recovered by the
/// caller; everything else ends the request.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("recipient address has no local part: {0:?}")]
    MalformedRecipient(String),

    #[error("no active tenant for key {0:?}")]
    TenantNotFound(String),

    #[error("attachment {file_name:?} could not be decoded: {reason}")]
    AttachmentDecode { file_name: String, reason: String },

    #[error("watermarking service error (status {status:?}): {body}")]
    WatermarkService { status: Option<u16>, body: String },

    #[error("watermark job {job_id} failed: {message}")]
    WatermarkJobFailed { job_id: String, message: String },

    #[error("watermark job {job_id} did not finish after {attempts} polls")]
    WatermarkJobTimeout { job_id: String, attempts: u32 },

    #[error("watermark archive contained no documents")]
    EmptyArchiveResult,

    #[error("all {attempted} attachments failed watermarking")]
    AllWatermarksFailed { attempted: usize },

    #[error("relay transmission failed: {0}")]
    RelayTransmission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable label for logs and error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRecipient(_) => "malformed_recipient",
            Self::TenantNotFound(_) => "tenant_not_found",
            Self::AttachmentDecode { .. } => "attachment_decode_error",
            Self::WatermarkService { .. } => "watermark_service_error",
            Self::WatermarkJobFailed { .. } => "watermark_job_failed",
            Self::WatermarkJobTimeout { .. } => "watermark_job_timeout",
            Self::EmptyArchiveResult => "empty_archive_result",
            Self::AllWatermarksFailed { .. } => "all_watermarks_failed",
            Self::RelayTransmission(_) => "relay_transmission_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status reported to the webhook caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRecipient(_) | Self::TenantNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a transport-level failure talking to the watermarking service.
    pub fn watermark_transport(err: reqwest::Error) -> Self {
        Self::WatermarkService {
            status: err.status().map(|s| s.as_u16()),
            body: err.to_string(),
        }
    }
}

/// Truncate an upstream body so it can be logged and echoed safely.
pub(crate) fn preview(body: &str) -> String {
    let mut end = body.len().min(500);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_failures_map_to_not_found() {
        assert_eq!(
            RelayError::MalformedRecipient("nobody".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RelayError::TenantNotFound("acme".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_pipeline_failures_map_to_server_error() {
        let errors = [
            RelayError::WatermarkService {
                status: Some(502),
                body: "bad gateway".into(),
            },
            RelayError::WatermarkJobTimeout {
                job_id: "j1".into(),
                attempts: 15,
            },
            RelayError::EmptyArchiveResult,
            RelayError::AllWatermarksFailed { attempted: 2 },
            RelayError::RelayTransmission("smtp down".into()),
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_job_failed_message_is_propagated() {
        let err = RelayError::WatermarkJobFailed {
            job_id: "job-9".into(),
            message: "corrupt pdf".into(),
        };
        assert_eq!(err.kind(), "watermark_job_failed");
        assert!(err.to_string().contains("corrupt pdf"));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let body = "é".repeat(400);
        let short = preview(&body);
        assert!(short.len() <= 500);
        assert!(short.chars().all(|c| c == 'é'));
    }
}
