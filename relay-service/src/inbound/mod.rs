//! Inbound email handling.
//!
//! ```text
//! webhook JSON → InboundEmailEvent → extract_documents() → EligibleAttachment[]
//! ```

pub mod attachments;
pub mod types;

pub use attachments::{
    extract_documents, is_document, EligibleAttachment, DOCUMENT_CONTENT_TYPE, DOCUMENT_EXTENSION,
};
pub use types::{InboundEmailEvent, RawAttachment};
