//! Relaying watermarked documents to the tenant.

pub mod assembler;
pub mod mailer;

pub use assembler::{OutboundMessage, RelayIdentity};
pub use mailer::{Mailer, ResendMailer};
