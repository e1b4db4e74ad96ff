//! Tenant directory backed by a Supabase (PostgREST) table.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use super::{TenantConfig, TenantDirectory};
use crate::error::{preview, RelayError};

/// PostgREST client for the tenant table.
#[derive(Clone)]
pub struct SupabaseDirectory {
    client: Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl SupabaseDirectory {
    pub fn new(client: Client, base_url: &str, service_key: &str, table: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            table: table.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

#[async_trait]
impl TenantDirectory for SupabaseDirectory {
    async fn find_active(&self, key: &str) -> Result<Option<TenantConfig>, RelayError> {
        let key_filter = format!("eq.{key}");
        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("select", "*"),
                ("email_prefix", key_filter.as_str()),
                ("active", "eq.true"),
                ("limit", "1"),
            ])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| {
                error!(tenant_id = %key, error = %e, "tenant_directory_request_failed");
                RelayError::Internal(format!("tenant directory unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                tenant_id = %key,
                status_code = status.as_u16(),
                body = %preview(&body),
                "tenant_directory_error_status"
            );
            return Err(RelayError::Internal(format!(
                "tenant directory returned {status}"
            )));
        }

        let rows: Vec<TenantConfig> = response.json().await.map_err(|e| {
            error!(tenant_id = %key, error = %e, "tenant_directory_decode_failed");
            RelayError::Internal(format!("tenant directory response invalid: {e}"))
        })?;

        info!(tenant_id = %key, rows = rows.len(), "tenant_directory_queried");

        Ok(rows.into_iter().next())
    }
}
