//! Pipeline controller.
//!
//! ```text
//! Received → TenantResolved → AttachmentsFiltered → Watermarking
//!                    │                      → [Unpacking] → Relaying → Done
//!                    └─ no documents → Done (no-op)
//!
//! `Unpacking` is only entered when the watermarker returns an archive.
//! ```
//!
//! Any step may end in `Failed`; the error carries the HTTP mapping.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::AttributionSource;
use crate::error::RelayError;
use crate::inbound::{extract_documents, InboundEmailEvent};
use crate::relay::{Mailer, RelayIdentity};
use crate::tenant::{resolve_tenant, TenantDirectory};
use crate::watermark::{
    attribution_for, unpack_archive, WatermarkOutput, WatermarkRequest, Watermarker,
};

/// Step the pipeline has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    TenantResolved,
    AttachmentsFiltered,
    Watermarking,
    Unpacking,
    Relaying,
    Done,
}

/// Successful end states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Nothing eligible to watermark; no downstream calls were made.
    NoDocuments,
    /// Documents were watermarked and relayed.
    Relayed {
        attachments: usize,
        provider_id: String,
    },
}

/// Collaborators shared by every request. Built once at startup.
pub struct Pipeline {
    directory: Arc<dyn TenantDirectory>,
    watermarker: Arc<dyn Watermarker>,
    mailer: Arc<dyn Mailer>,
    identity: RelayIdentity,
    attribution: AttributionSource,
}

impl Pipeline {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        watermarker: Arc<dyn Watermarker>,
        mailer: Arc<dyn Mailer>,
        identity: RelayIdentity,
        attribution: AttributionSource,
    ) -> Self {
        Self {
            directory,
            watermarker,
            mailer,
            identity,
            attribution,
        }
    }

    /// Process one inbound email end to end.
    pub async fn run(&self, event: &InboundEmailEvent) -> Result<PipelineOutcome, RelayError> {
        let mut stage = Stage::Received;
        let mut tenant_id: Option<String> = None;

        let result = self.advance(event, &mut stage, &mut tenant_id).await;

        match &result {
            Ok(outcome) => info!(
                tenant_id = ?tenant_id,
                outcome = ?outcome,
                "pipeline_done"
            ),
            Err(e) => error!(
                tenant_id = ?tenant_id,
                failed_at = ?stage,
                error_kind = e.kind(),
                error = %e,
                "pipeline_failed"
            ),
        }

        result
    }

    async fn advance(
        &self,
        event: &InboundEmailEvent,
        stage: &mut Stage,
        tenant_id: &mut Option<String>,
    ) -> Result<PipelineOutcome, RelayError> {
        let recipient = event.recipient();
        info!(
            recipient = %recipient,
            sender = %event.sender_address(),
            attachments = event.attachments.len(),
            "pipeline_received"
        );

        let tenant = resolve_tenant(self.directory.as_ref(), &recipient).await?;
        *tenant_id = Some(tenant.key.clone());
        *stage = Stage::TenantResolved;

        let documents = extract_documents(&event.attachments);
        if documents.is_empty() {
            info!(tenant_id = %tenant.key, "pipeline_no_documents");
            *stage = Stage::Done;
            return Ok(PipelineOutcome::NoDocuments);
        }
        *stage = Stage::AttachmentsFiltered;

        let attribution = attribution_for(event, self.attribution);
        let request = WatermarkRequest::new(&tenant, attribution, documents);

        *stage = Stage::Watermarking;
        info!(
            tenant_id = %tenant.key,
            variant = self.watermarker.variant(),
            files = request.files.len(),
            attribution = %request.attribution,
            "pipeline_watermarking"
        );
        let attempted = request.files.len();
        let processed = match self.watermarker.submit(request).await? {
            WatermarkOutput::Documents(documents) => documents,
            WatermarkOutput::Archive(bytes) => {
                *stage = Stage::Unpacking;
                info!(
                    tenant_id = %tenant.key,
                    size_bytes = bytes.len(),
                    "pipeline_unpacking"
                );
                unpack_archive(&bytes)?
            }
        };
        if processed.is_empty() {
            return Err(RelayError::AllWatermarksFailed { attempted });
        }

        *stage = Stage::Relaying;
        let attachments = processed.len();
        let message = self.identity.assemble(event, &tenant, processed);
        let provider_id = self.mailer.send(&message).await?;

        *stage = Stage::Done;
        Ok(PipelineOutcome::Relayed {
            attachments,
            provider_id,
        })
    }
}
