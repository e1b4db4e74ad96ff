//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. Credentials have no
//! defaults; `Config::validate` rejects a configuration that is missing any
//! of them before the server starts.

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

/// Which watermarking protocol variant this deployment speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkMode {
    /// One call per file; content is staged in object storage and passed by URL.
    Staged,
    /// One call per file; content is sent inline as base64.
    Inline,
    /// One call for the whole batch; the service answers with a job to poll.
    Batch,
}

impl WatermarkMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "staged" => Some(Self::Staged),
            "inline" => Some(Self::Inline),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Inline => "inline",
            Self::Batch => "batch",
        }
    }

    /// Attribution source used when `ATTRIBUTION_SOURCE` is not set.
    pub fn default_attribution(self) -> AttributionSource {
        match self {
            Self::Staged | Self::Inline => AttributionSource::SenderName,
            Self::Batch => AttributionSource::SenderDomain,
        }
    }
}

/// What the watermark text is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionSource {
    /// Sender display name, falling back to the sender address.
    SenderName,
    /// Domain part of the sender address.
    SenderDomain,
}

impl AttributionSource {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sender_name" | "name" => Some(Self::SenderName),
            "sender_domain" | "domain" => Some(Self::SenderDomain),
            _ => None,
        }
    }
}

/// Whether the relayed message keeps the original subject and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectMode {
    Passthrough,
    Templated,
}

impl SubjectMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Some(Self::Passthrough),
            "templated" => Some(Self::Templated),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Maximum accepted webhook body size in bytes
    pub max_body_bytes: usize,

    /// Supabase project URL (tenant directory and object storage)
    pub supabase_url: String,

    /// Supabase service role key
    pub supabase_service_key: String,

    /// Table holding tenant records
    pub tenant_table: String,

    /// Storage bucket used for staged uploads
    pub staging_bucket: String,

    /// Watermarking service endpoint
    pub watermark_api_url: String,

    /// Optional bearer token for the watermarking service
    pub watermark_api_key: Option<String>,

    /// Protocol variant spoken with the watermarking service
    pub watermark_mode: WatermarkMode,

    /// Where the attribution text comes from
    pub attribution_source: AttributionSource,

    /// Delay between job status polls
    pub job_poll_interval: Duration,

    /// Maximum number of job status polls
    pub job_poll_max_attempts: u32,

    /// HTTP request timeout in milliseconds for outbound calls
    pub request_timeout_ms: u64,

    /// Resend API key
    pub resend_api_key: String,

    /// Resend API base URL
    pub resend_api_url: String,

    /// Verified address relayed mail is sent from
    pub relay_from_address: String,

    /// Display name appended to the sender label
    pub relay_from_name: String,

    /// Subject/body handling for relayed mail
    pub subject_mode: SubjectMode,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let watermark_mode = match env::var("WATERMARK_MODE") {
            Ok(raw) => WatermarkMode::parse(&raw).unwrap_or_else(|| {
                warn!(
                    env_var = "WATERMARK_MODE",
                    value = %raw,
                    "Unknown watermark mode, using batch"
                );
                WatermarkMode::Batch
            }),
            Err(_) => WatermarkMode::Batch,
        };

        let attribution_source = env::var("ATTRIBUTION_SOURCE")
            .ok()
            .and_then(|raw| {
                let parsed = AttributionSource::parse(&raw);
                if parsed.is_none() {
                    warn!(
                        env_var = "ATTRIBUTION_SOURCE",
                        value = %raw,
                        "Unknown attribution source, using mode default"
                    );
                }
                parsed
            })
            .unwrap_or_else(|| watermark_mode.default_attribution());

        let subject_mode = match env::var("SUBJECT_MODE") {
            Ok(raw) => SubjectMode::parse(&raw).unwrap_or_else(|| {
                warn!(
                    env_var = "SUBJECT_MODE",
                    value = %raw,
                    "Unknown subject mode, using passthrough"
                );
                SubjectMode::Passthrough
            }),
            Err(_) => SubjectMode::Passthrough,
        };

        Config {
            port: parse_or("PORT", 8080),

            max_body_bytes: parse_or("MAX_BODY_BYTES", 25 * 1024 * 1024),

            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default(),

            supabase_service_key: env::var("SUPABASE_SERVICE_KEY").unwrap_or_default(),

            tenant_table: env::var("TENANT_TABLE").unwrap_or_else(|_| "funders".to_string()),

            staging_bucket: env::var("STAGING_BUCKET")
                .unwrap_or_else(|_| "temp-uploads".to_string()),

            watermark_api_url: env::var("WATERMARK_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default(),

            watermark_api_key: non_empty("WATERMARK_API_KEY"),

            watermark_mode,

            attribution_source,

            job_poll_interval: Duration::from_millis(parse_or("JOB_POLL_INTERVAL_MS", 2000)),

            job_poll_max_attempts: parse_or("JOB_POLL_MAX_ATTEMPTS", 15),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 30_000),

            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),

            resend_api_url: env::var("RESEND_API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),

            relay_from_address: env::var("RELAY_FROM_ADDRESS").unwrap_or_default(),

            relay_from_name: env::var("RELAY_FROM_NAME")
                .unwrap_or_else(|_| "Document Gateway".to_string()),

            subject_mode,
        }
    }

    /// Reject configurations that cannot serve a single request.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.supabase_url.is_empty() {
            missing.push("SUPABASE_URL");
        }
        if self.supabase_service_key.is_empty() {
            missing.push("SUPABASE_SERVICE_KEY");
        }
        if self.watermark_api_url.is_empty() {
            missing.push("WATERMARK_API_URL");
        }
        if self.resend_api_key.is_empty() {
            missing.push("RESEND_API_KEY");
        }
        if self.relay_from_address.is_empty() {
            missing.push("RELAY_FROM_ADDRESS");
        }
        if !missing.is_empty() {
            bail!("missing required configuration: {}", missing.join(", "));
        }
        if self.job_poll_max_attempts == 0 {
            bail!("JOB_POLL_MAX_ATTEMPTS must be at least 1");
        }
        url::Url::parse(&self.watermark_api_url)
            .map_err(|e| anyhow::anyhow!("WATERMARK_API_URL is not a valid URL: {e}"))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Read an environment variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
impl Config {
    /// Fully populated configuration for tests.
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            max_body_bytes: 1024 * 1024,
            supabase_url: "http://supabase.test".to_string(),
            supabase_service_key: "service-key".to_string(),
            tenant_table: "funders".to_string(),
            staging_bucket: "temp-uploads".to_string(),
            watermark_api_url: "http://watermark.test/api".to_string(),
            watermark_api_key: None,
            watermark_mode: WatermarkMode::Batch,
            attribution_source: AttributionSource::SenderDomain,
            job_poll_interval: Duration::from_millis(1),
            job_poll_max_attempts: 15,
            request_timeout_ms: 1000,
            resend_api_key: "re_test".to_string(),
            resend_api_url: "http://resend.test".to_string(),
            relay_from_address: "relay@gateway.example".to_string(),
            relay_from_name: "Document Gateway".to_string(),
            subject_mode: SubjectMode::Passthrough,
        }
    }
}
