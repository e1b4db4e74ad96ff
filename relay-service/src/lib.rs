//! Watermark Relay - inbound email gateway that watermarks PDF attachments.
//!
//! An email sent to `<tenant>@<gateway>` arrives as a webhook. The relay
//! resolves the tenant, keeps the PDF attachments, has them watermarked by an
//! external service and forwards the results to the tenant's real address.
//!
//! ## Architecture
//!
//! ```text
//! Webhook → tenant lookup → PDF filter → Watermarker → (unzip) → relay mail
//! ```

pub mod config;
pub mod error;
pub mod inbound;
pub mod pipeline;
pub mod relay;
pub mod storage;
pub mod tenant;
pub mod watermark;
pub mod web;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::RelayError;
pub use inbound::{InboundEmailEvent, RawAttachment};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use web::AppState;
