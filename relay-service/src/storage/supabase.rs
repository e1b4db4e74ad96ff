//! Supabase Storage implementation of [`ObjectStorage`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::error;

use super::ObjectStorage;
use crate::error::{preview, RelayError};

#[derive(Clone)]
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: Client, base_url: &str, service_key: &str, bucket: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    async fn check(
        response: reqwest::Response,
        action: &str,
        path: &str,
    ) -> Result<(), RelayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        error!(
            action = action,
            path = %path,
            status_code = status.as_u16(),
            body = %preview(&body),
            "storage_error_status"
        );
        Err(RelayError::Internal(format!(
            "storage {action} of {path} returned {status}"
        )))
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RelayError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("storage upload failed: {e}")))?;

        Self::check(response, "upload", path).await
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn remove(&self, path: &str) -> Result<(), RelayError> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("storage remove failed: {e}")))?;

        Self::check(response, "remove", path).await
    }
}
