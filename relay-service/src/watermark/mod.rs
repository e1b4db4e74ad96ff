//! Watermark orchestration.
//!
//! One [`Watermarker`] is chosen at startup from `WATERMARK_MODE`:
//!
//! ```text
//! staged → PerFileWatermarker (stage → file_url call → remove), per file
//! inline → PerFileWatermarker (inline base64 call), per file
//! batch  → BatchWatermarker (inline call → job poll → download)
//! ```
//!
//! The pipeline only sees `submit(request) -> WatermarkOutput`; archive
//! results are unpacked by the pipeline itself.

pub mod archive;
pub mod batch;
pub mod client;
pub mod per_file;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AttributionSource, Config, WatermarkMode};
use crate::error::RelayError;
use crate::inbound::{EligibleAttachment, InboundEmailEvent, DOCUMENT_CONTENT_TYPE};
use crate::storage::ObjectStorage;
use crate::tenant::TenantConfig;

pub use archive::{is_archive, unpack_archive};
pub use batch::{BatchWatermarker, PollPolicy};
pub use client::{
    Download, HttpWatermarkApi, InlineFile, JobState, WatermarkApi, WatermarkJob,
    WatermarkPayload, WatermarkResponse,
};
pub use per_file::{FileDelivery, PerFileWatermarker};

/// A watermarked document ready to be relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAttachment {
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

impl ProcessedAttachment {
    pub fn document(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
            content_type: DOCUMENT_CONTENT_TYPE.to_string(),
        }
    }
}

/// What a watermarker hands back to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkOutput {
    /// Ready-to-relay documents, at least one.
    Documents(Vec<ProcessedAttachment>),
    /// A zip result still to be expanded into documents.
    Archive(Vec<u8>),
}

/// Everything the watermarking service needs for one pipeline run.
#[derive(Debug, Clone)]
pub struct WatermarkRequest {
    pub tenant_id: String,
    /// Identity the call is authorised as
    pub user_id: String,
    pub logo_url: Option<String>,
    /// Text embedded into the documents
    pub attribution: String,
    pub files: Vec<EligibleAttachment>,
}

impl WatermarkRequest {
    pub fn new(tenant: &TenantConfig, attribution: String, files: Vec<EligibleAttachment>) -> Self {
        Self {
            tenant_id: tenant.key.clone(),
            user_id: tenant.user_id.clone(),
            logo_url: tenant.logo_url.clone(),
            attribution,
            files,
        }
    }
}

/// Delegates watermarking of a document set to an external service.
#[async_trait]
pub trait Watermarker: Send + Sync {
    /// Short name of the protocol variant, for logs.
    fn variant(&self) -> &'static str;

    /// Watermark every file in `request`.
    async fn submit(&self, request: WatermarkRequest) -> Result<WatermarkOutput, RelayError>;
}

/// Attribution text for an inbound email under the given policy.
pub fn attribution_for(event: &InboundEmailEvent, source: AttributionSource) -> String {
    match source {
        AttributionSource::SenderName => event.sender_label(),
        AttributionSource::SenderDomain => event
            .sender_domain()
            .unwrap_or_else(|| event.sender_address()),
    }
}

/// Build the configured orchestrator variant.
pub fn build_watermarker(
    config: &Config,
    api: Arc<dyn WatermarkApi>,
    storage: Arc<dyn ObjectStorage>,
) -> Arc<dyn Watermarker> {
    match config.watermark_mode {
        WatermarkMode::Staged => {
            Arc::new(PerFileWatermarker::new(api, FileDelivery::Staged(storage)))
        }
        WatermarkMode::Inline => Arc::new(PerFileWatermarker::new(api, FileDelivery::Inline)),
        WatermarkMode::Batch => Arc::new(BatchWatermarker::new(
            api,
            PollPolicy {
                interval: config.job_poll_interval,
                max_attempts: config.job_poll_max_attempts,
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from: &str, from_name: &str) -> InboundEmailEvent {
        InboundEmailEvent {
            from: from.to_string(),
            from_name: from_name.to_string(),
            to: "acme@gateway.example".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_attribution_by_name() {
        let e = event("jane@broker.example", "Jane Broker");
        assert_eq!(attribution_for(&e, AttributionSource::SenderName), "Jane Broker");
    }

    #[test]
    fn test_attribution_by_domain() {
        let e = event("jane@broker.example", "Jane Broker");
        assert_eq!(
            attribution_for(&e, AttributionSource::SenderDomain),
            "broker.example"
        );
    }

    #[test]
    fn test_attribution_domain_falls_back_to_address() {
        let e = event("postmaster", "");
        assert_eq!(attribution_for(&e, AttributionSource::SenderDomain), "postmaster");
    }

    #[test]
    fn test_request_carries_tenant_identity() {
        let tenant = TenantConfig {
            key: "acme".to_string(),
            active: true,
            destination_email: "ops@acme.example".to_string(),
            company_name: "Acme".to_string(),
            logo_url: Some("https://cdn.test/acme.png".to_string()),
            user_id: "owner-7".to_string(),
        };

        let request = WatermarkRequest::new(&tenant, "broker.example".to_string(), Vec::new());

        assert_eq!(request.user_id, "owner-7");
        assert_eq!(request.tenant_id, "acme");
        assert_eq!(request.logo_url.as_deref(), Some("https://cdn.test/acme.png"));
    }

    #[test]
    fn test_build_watermarker_selects_variant() {
        struct NoApi;
        #[async_trait]
        impl WatermarkApi for NoApi {
            async fn submit(&self, _: &WatermarkPayload) -> Result<WatermarkResponse, RelayError> {
                unreachable!()
            }
            async fn job_status(&self, _: &str) -> Result<WatermarkJob, RelayError> {
                unreachable!()
            }
            async fn download(&self, _: &str) -> Result<Download, RelayError> {
                unreachable!()
            }
        }
        struct NoStorage;
        #[async_trait]
        impl ObjectStorage for NoStorage {
            async fn upload(&self, _: &str, _: Vec<u8>, _: &str) -> Result<(), RelayError> {
                unreachable!()
            }
            fn public_url(&self, path: &str) -> String {
                path.to_string()
            }
            async fn remove(&self, _: &str) -> Result<(), RelayError> {
                unreachable!()
            }
        }

        let mut config = Config::for_tests();
        for (mode, expected) in [
            (WatermarkMode::Staged, "staged"),
            (WatermarkMode::Inline, "inline"),
            (WatermarkMode::Batch, "batch"),
        ] {
            config.watermark_mode = mode;
            let w = build_watermarker(&config, Arc::new(NoApi), Arc::new(NoStorage));
            assert_eq!(w.variant(), expected);
        }
    }
}
