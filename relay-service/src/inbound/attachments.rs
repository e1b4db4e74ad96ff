//! Attachment filtering and decoding.
//!
//! Only PDF attachments are forwarded to the watermarking service. Other
//! files are dropped silently; PDFs whose content does not decode are dropped
//! with a warning so the rest of the batch can proceed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::inbound::types::RawAttachment;

/// File extension of watermarkable documents (compared case-insensitively).
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Content type of every document the relay produces.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/pdf";

/// A decoded attachment that is eligible for watermarking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleAttachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Whether a file name carries the document extension.
pub fn is_document(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

/// Filter raw attachments down to decoded, eligible documents.
///
/// Input order is preserved.
pub fn extract_documents(attachments: &[RawAttachment]) -> Vec<EligibleAttachment> {
    let mut eligible = Vec::with_capacity(attachments.len());
    let mut skipped = 0usize;

    for attachment in attachments {
        if !is_document(&attachment.name) {
            skipped += 1;
            continue;
        }

        match decode_attachment(attachment) {
            Ok(doc) => eligible.push(doc),
            Err(e) => {
                warn!(
                    file_name = %attachment.name,
                    content_type = %attachment.content_type,
                    error = %e,
                    "attachment_decode_failed"
                );
            }
        }
    }

    info!(
        received = attachments.len(),
        eligible = eligible.len(),
        skipped_non_document = skipped,
        "attachments_filtered"
    );

    eligible
}

fn decode_attachment(attachment: &RawAttachment) -> Result<EligibleAttachment, RelayError> {
    // Some providers wrap base64 at 76 columns.
    let compact: String = attachment
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let content = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RelayError::AttachmentDecode {
            file_name: attachment.name.clone(),
            reason: e.to_string(),
        })?;

    if content.is_empty() {
        return Err(RelayError::AttachmentDecode {
            file_name: attachment.name.clone(),
            reason: "decoded content is empty".to_string(),
        });
    }

    Ok(EligibleAttachment {
        file_name: attachment.name.clone(),
        content,
    })
}
