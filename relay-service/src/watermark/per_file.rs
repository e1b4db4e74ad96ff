//! Synchronous per-file watermarking.
//!
//! Each document gets its own service call. A failed document is logged and
//! left out of the result; the run only fails when every document failed.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use tracing::{info, warn};

use super::client::{InlineFile, WatermarkApi, WatermarkPayload, WatermarkResponse};
use super::{ProcessedAttachment, WatermarkOutput, WatermarkRequest, Watermarker};
use crate::error::RelayError;
use crate::inbound::{EligibleAttachment, DOCUMENT_CONTENT_TYPE};
use crate::storage::{staging_path, ObjectStorage, StagedObject};

/// How a document reaches the watermarking service.
pub enum FileDelivery {
    /// Base64 in the request body.
    Inline,
    /// Uploaded to object storage and passed as a public URL.
    Staged(Arc<dyn ObjectStorage>),
}

pub struct PerFileWatermarker {
    api: Arc<dyn WatermarkApi>,
    delivery: FileDelivery,
}

impl PerFileWatermarker {
    pub fn new(api: Arc<dyn WatermarkApi>, delivery: FileDelivery) -> Self {
        Self { api, delivery }
    }

    async fn watermark_one(
        &self,
        request: &WatermarkRequest,
        file: &EligibleAttachment,
    ) -> Result<ProcessedAttachment, RelayError> {
        let response = match &self.delivery {
            FileDelivery::Inline => {
                let payload = WatermarkPayload::InlineFiles {
                    user_id: request.user_id.clone(),
                    attribution: request.attribution.clone(),
                    logo_url: request.logo_url.clone(),
                    files: vec![InlineFile {
                        name: file.file_name.clone(),
                        content: STANDARD.encode(&file.content),
                    }],
                    async_job: false,
                };
                self.api.submit(&payload).await?
            }
            FileDelivery::Staged(storage) => {
                let path = staging_path(&request.tenant_id, &file.file_name, &file.content);
                let staged = StagedObject::new(Arc::clone(storage), path);

                let outcome = async {
                    let file_url = staged
                        .upload(file.content.clone(), DOCUMENT_CONTENT_TYPE)
                        .await?;
                    let payload = WatermarkPayload::FileReference {
                        user_id: request.user_id.clone(),
                        attribution: request.attribution.clone(),
                        logo_url: request.logo_url.clone(),
                        file_url,
                    };
                    self.api.submit(&payload).await
                }
                .await;

                staged.release().await;
                outcome?
            }
        };

        self.materialize(response, file).await
    }

    /// Turn a synchronous response into document bytes.
    async fn materialize(
        &self,
        response: WatermarkResponse,
        file: &EligibleAttachment,
    ) -> Result<ProcessedAttachment, RelayError> {
        let content = if let Some(encoded) = response.watermarked_file.filter(|f| !f.is_empty()) {
            STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| RelayError::WatermarkService {
                    status: None,
                    body: format!("watermarked file is not valid base64: {e}"),
                })?
        } else if let Some(url) = response.file_url.filter(|u| !u.is_empty()) {
            self.api.download(&url).await?.bytes
        } else {
            return Err(RelayError::WatermarkService {
                status: None,
                body: "response carried neither watermarked_file nor file_url".to_string(),
            });
        };

        if content.is_empty() {
            return Err(RelayError::WatermarkService {
                status: None,
                body: "watermarked file is empty".to_string(),
            });
        }

        Ok(ProcessedAttachment::document(
            format!("watermarked_{}", file.file_name),
            content,
        ))
    }
}

#[async_trait]
impl Watermarker for PerFileWatermarker {
    fn variant(&self) -> &'static str {
        match self.delivery {
            FileDelivery::Inline => "inline",
            FileDelivery::Staged(_) => "staged",
        }
    }

    async fn submit(&self, request: WatermarkRequest) -> Result<WatermarkOutput, RelayError> {
        info!(
            tenant_id = %request.tenant_id,
            variant = self.variant(),
            files = request.files.len(),
            "watermark_per_file_start"
        );

        // join_all yields results in input order regardless of completion order.
        let results = join_all(
            request
                .files
                .iter()
                .map(|file| self.watermark_one(&request, file)),
        )
        .await;

        let attempted = results.len();
        let mut processed = Vec::with_capacity(attempted);
        for (file, result) in request.files.iter().zip(results) {
            match result {
                Ok(attachment) => processed.push(attachment),
                Err(e) => warn!(
                    tenant_id = %request.tenant_id,
                    file_name = %file.file_name,
                    error_kind = e.kind(),
                    error = %e,
                    "watermark_file_failed"
                ),
            }
        }

        info!(
            tenant_id = %request.tenant_id,
            attempted = attempted,
            succeeded = processed.len(),
            "watermark_per_file_complete"
        );

        if processed.is_empty() {
            return Err(RelayError::AllWatermarksFailed { attempted });
        }
        Ok(WatermarkOutput::Documents(processed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingStorage, ScriptedApi};

    async fn watermark(
        w: &PerFileWatermarker,
        request: WatermarkRequest,
    ) -> Result<Vec<ProcessedAttachment>, RelayError> {
        match w.submit(request).await? {
            WatermarkOutput::Documents(documents) => Ok(documents),
            WatermarkOutput::Archive(_) => panic!("per-file variants return documents"),
        }
    }

    fn request(names: &[&str]) -> WatermarkRequest {
        WatermarkRequest {
            tenant_id: "acme".to_string(),
            user_id: "owner-1".to_string(),
            logo_url: None,
            attribution: "Jane Broker".to_string(),
            files: names
                .iter()
                .map(|n| EligibleAttachment {
                    file_name: n.to_string(),
                    content: format!("%PDF {n}").into_bytes(),
                })
                .collect(),
        }
    }

    /// Fail any inline call whose file name contains "bad".
    fn inline_api() -> ScriptedApi {
        ScriptedApi::new(|payload| match payload {
            WatermarkPayload::InlineFiles { files, .. } if files[0].name.contains("bad") => {
                Err(RelayError::WatermarkService {
                    status: Some(422),
                    body: "unreadable pdf".to_string(),
                })
            }
            WatermarkPayload::InlineFiles { files, .. } => Ok(WatermarkResponse {
                watermarked_file: Some(STANDARD.encode(format!("marked:{}", files[0].name))),
                ..Default::default()
            }),
            WatermarkPayload::FileReference { file_url, .. } if file_url.contains("bad") => {
                Err(RelayError::WatermarkService {
                    status: Some(500),
                    body: "boom".to_string(),
                })
            }
            WatermarkPayload::FileReference { .. } => Ok(WatermarkResponse {
                file_url: Some("https://results.test/out.pdf".to_string()),
                ..Default::default()
            }),
        })
    }

    #[tokio::test]
    async fn test_inline_all_succeed_preserves_order() {
        let api = Arc::new(inline_api());
        let w = PerFileWatermarker::new(api.clone(), FileDelivery::Inline);

        let out = watermark(&w, request(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();

        let names: Vec<_> = out.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["watermarked_a.pdf", "watermarked_b.pdf", "watermarked_c.pdf"]
        );
        assert_eq!(out[1].content, b"marked:b.pdf");
        assert_eq!(api.submitted().len(), 3);
    }

    #[tokio::test]
    async fn test_partial_failure_prunes_results() {
        let w = PerFileWatermarker::new(Arc::new(inline_api()), FileDelivery::Inline);

        let out = watermark(&w, request(&["a.pdf", "bad1.pdf", "c.pdf", "bad2.pdf"]))
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].file_name, "watermarked_a.pdf");
        assert_eq!(out[1].file_name, "watermarked_c.pdf");
    }

    #[tokio::test]
    async fn test_all_failures_is_all_watermarks_failed() {
        let w = PerFileWatermarker::new(Arc::new(inline_api()), FileDelivery::Inline);

        let err = watermark(&w, request(&["bad1.pdf", "bad2.pdf"]))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::AllWatermarksFailed { attempted: 2 }));
    }

    #[tokio::test]
    async fn test_missing_result_fields_count_as_failure() {
        let api = ScriptedApi::new(|_| Ok(WatermarkResponse::default()));
        let w = PerFileWatermarker::new(Arc::new(api), FileDelivery::Inline);

        let err = watermark(&w, request(&["a.pdf"])).await.unwrap_err();

        assert!(matches!(err, RelayError::AllWatermarksFailed { attempted: 1 }));
    }

    #[tokio::test]
    async fn test_staged_downloads_result_and_cleans_up() {
        let api = Arc::new(inline_api().with_download(
            "https://results.test/out.pdf",
            None,
            b"%PDF marked".to_vec(),
        ));
        let storage = Arc::new(RecordingStorage::default());
        let w = PerFileWatermarker::new(api.clone(), FileDelivery::Staged(storage.clone()));

        let out = watermark(&w, request(&["deal.pdf"])).await.unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, b"%PDF marked");

        let calls = storage.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("upload:acme/"));
        assert_eq!(calls[1], calls[0].replacen("upload:", "remove:", 1));

        match &api.submitted()[0] {
            WatermarkPayload::FileReference { file_url, .. } => {
                assert!(file_url.starts_with("https://storage.test/public/acme/"));
            }
            other => panic!("expected file reference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_staged_cleanup_runs_when_call_fails() {
        let storage = Arc::new(RecordingStorage::default());
        let w = PerFileWatermarker::new(
            Arc::new(inline_api()),
            FileDelivery::Staged(storage.clone()),
        );

        let err = watermark(&w, request(&["bad.pdf"])).await.unwrap_err();
        assert!(matches!(err, RelayError::AllWatermarksFailed { .. }));

        let calls = storage.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("upload:"));
        assert!(calls[1].starts_with("remove:"));
    }

    #[tokio::test]
    async fn test_staged_cleanup_runs_when_upload_fails() {
        let storage = Arc::new(RecordingStorage::failing_uploads());
        let api = Arc::new(inline_api());
        let w = PerFileWatermarker::new(api.clone(), FileDelivery::Staged(storage.clone()));

        let err = watermark(&w, request(&["deal.pdf"])).await.unwrap_err();
        assert!(matches!(err, RelayError::AllWatermarksFailed { .. }));

        assert!(api.submitted().is_empty());
        let calls = storage.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("remove:"));
    }
}
