//! Object storage used to stage documents at a public URL.
//!
//! Only the `staged` watermarking variant touches storage. Every staged
//! object is owned by one request and must be removed before it ends.

pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::RelayError;

pub use supabase::SupabaseStorage;

/// Minimal object storage capability.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), RelayError>;

    /// Absolute URL under which `path` is publicly readable.
    fn public_url(&self, path: &str) -> String;

    async fn remove(&self, path: &str) -> Result<(), RelayError>;
}

/// Build a collision-resistant staging path for one document.
pub fn staging_path(tenant_id: &str, file_name: &str, content: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(content));
    let nonce: u32 = rand::thread_rng().gen();
    let safe_name: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}/{}-{:08x}-{}", tenant_id, &digest[..16], nonce, safe_name)
}

/// A staged object whose removal is scheduled at construction.
///
/// Call [`StagedObject::release`] once the object is no longer needed. If
/// the guard is dropped without being released (the request future was
/// abandoned), removal is spawned onto the current runtime instead.
pub struct StagedObject {
    storage: Arc<dyn ObjectStorage>,
    path: String,
    released: bool,
}

impl StagedObject {
    pub fn new(storage: Arc<dyn ObjectStorage>, path: String) -> Self {
        Self {
            storage,
            path,
            released: false,
        }
    }

    /// Upload `bytes` and return the public URL of the staged object.
    pub async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, RelayError> {
        let size = bytes.len();
        self.storage.upload(&self.path, bytes, content_type).await?;
        let url = self.storage.public_url(&self.path);
        info!(path = %self.path, size_bytes = size, "staging_uploaded");
        Ok(url)
    }

    /// Remove the staged object. Failures are logged, never propagated.
    pub async fn release(mut self) {
        self.released = true;
        match self.storage.remove(&self.path).await {
            Ok(()) => info!(path = %self.path, "staging_removed"),
            Err(e) => warn!(path = %self.path, error = %e, "staging_remove_failed"),
        }
    }
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let storage = Arc::clone(&self.storage);
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(path = %path, "staging_abandoned_scheduling_remove");
                handle.spawn(async move {
                    if let Err(e) = storage.remove(&path).await {
                        warn!(path = %path, error = %e, "staging_remove_failed");
                    }
                });
            }
            Err(_) => warn!(path = %path, "staging_leaked_no_runtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStorage;
    use std::time::Duration;

    #[test]
    fn test_staging_path_is_scoped_and_sanitised() {
        let path = staging_path("acme", "deal memo (v2).pdf", b"%PDF");
        assert!(path.starts_with("acme/"));
        assert!(path.ends_with("deal_memo__v2_.pdf"));
        assert!(!path.contains(' '));
    }

    #[test]
    fn test_staging_paths_differ_for_same_file() {
        let a = staging_path("acme", "deal.pdf", b"%PDF");
        let b = staging_path("acme", "deal.pdf", b"%PDF");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_release_removes_object() {
        let storage = Arc::new(RecordingStorage::default());
        let staged = StagedObject::new(storage.clone(), "acme/x.pdf".to_string());

        let url = staged
            .upload(b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(url, "https://storage.test/public/acme/x.pdf");
        staged.release().await;

        assert_eq!(storage.calls(), vec!["upload:acme/x.pdf", "remove:acme/x.pdf"]);
    }

    #[tokio::test]
    async fn test_dropped_guard_schedules_remove() {
        let storage = Arc::new(RecordingStorage::default());
        {
            let staged = StagedObject::new(storage.clone(), "acme/y.pdf".to_string());
            staged
                .upload(b"%PDF".to_vec(), "application/pdf")
                .await
                .unwrap();
        }

        for _ in 0..50 {
            if storage.calls().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(storage.calls(), vec!["upload:acme/y.pdf", "remove:acme/y.pdf"]);
    }
}
