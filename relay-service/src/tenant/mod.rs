//! Tenant ("funder") resolution.
//!
//! A gateway address `acme@gateway.example` belongs to the tenant whose key
//! is `acme`. Records are fetched fresh for every request and never cached.

pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RelayError;

pub use supabase::SupabaseDirectory;

/// Snapshot of one tenant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Gateway local part addressing this tenant
    #[serde(rename = "email_prefix")]
    pub key: String,
    pub active: bool,
    /// Where watermarked documents are delivered
    pub destination_email: String,
    #[serde(default)]
    pub company_name: String,
    /// Optional logo passed to the watermarking service
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Owner identity authorising watermarking calls
    pub user_id: String,
}

/// Lookup capability over the tenant directory.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Return the active record for `key`, if any.
    async fn find_active(&self, key: &str) -> Result<Option<TenantConfig>, RelayError>;
}

/// Derive the tenant key from a recipient address.
pub fn tenant_key(recipient: &str) -> Result<String, RelayError> {
    let (local, _) = recipient
        .split_once('@')
        .ok_or_else(|| RelayError::MalformedRecipient(recipient.to_string()))?;

    let key = local.trim().to_lowercase();
    if key.is_empty() {
        return Err(RelayError::MalformedRecipient(recipient.to_string()));
    }
    Ok(key)
}

/// Resolve a recipient address to its active tenant.
pub async fn resolve_tenant(
    directory: &dyn TenantDirectory,
    recipient: &str,
) -> Result<TenantConfig, RelayError> {
    let key = tenant_key(recipient).map_err(|e| {
        warn!(recipient = %recipient, "tenant_recipient_malformed");
        e
    })?;

    match directory.find_active(&key).await? {
        Some(tenant) if tenant.active => {
            info!(
                tenant_id = %tenant.key,
                company = %tenant.company_name,
                "tenant_resolved"
            );
            Ok(tenant)
        }
        Some(_) => {
            warn!(tenant_id = %key, "tenant_inactive");
            Err(RelayError::TenantNotFound(key))
        }
        None => {
            warn!(tenant_id = %key, "tenant_not_found");
            Err(RelayError::TenantNotFound(key))
        }
    }
}
