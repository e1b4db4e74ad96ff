//! Outbound message assembly.

use crate::config::SubjectMode;
use crate::inbound::InboundEmailEvent;
use crate::tenant::TenantConfig;
use crate::watermark::ProcessedAttachment;

/// A fully addressed message ready for the mail provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Gateway sending identity, never the original sender
    pub from: String,
    /// Original sender, so replies reach them
    pub reply_to: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub attachments: Vec<ProcessedAttachment>,
}

/// Sending identity settings that do not vary per request.
#[derive(Debug, Clone)]
pub struct RelayIdentity {
    pub from_address: String,
    pub from_name: String,
    pub subject_mode: SubjectMode,
}

impl RelayIdentity {
    /// Build the message relaying `attachments` to the tenant.
    pub fn assemble(
        &self,
        event: &InboundEmailEvent,
        tenant: &TenantConfig,
        attachments: Vec<ProcessedAttachment>,
    ) -> OutboundMessage {
        let sender = event.sender_label();
        let from = format!(
            "{} <{}>",
            quote_display(&format!("{} via {}", sender, self.from_name)),
            self.from_address
        );

        let (subject, text_body) = match self.subject_mode {
            SubjectMode::Passthrough => {
                let subject = if event.subject.trim().is_empty() {
                    format!("Document from {sender}")
                } else {
                    event.subject.clone()
                };
                let body = event
                    .text_body
                    .clone()
                    .filter(|b| !b.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!("Forwarded from {} ({}).", sender, event.sender_address())
                    });
                (subject, body)
            }
            SubjectMode::Templated => (
                format!("Watermarked document from {sender}"),
                format!(
                    "{} sent the attached document(s) to {} via {}.",
                    sender,
                    display_company(tenant),
                    self.from_name
                ),
            ),
        };

        OutboundMessage {
            from,
            reply_to: event.sender_address(),
            to: tenant.destination_email.clone(),
            subject,
            text_body,
            attachments,
        }
    }
}

/// Render a display name as an RFC 5322 quoted string.
///
/// Control characters and angle brackets are dropped; `\` and `"` are
/// escaped, so commas and `@` stay inside the phrase.
fn quote_display(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>'))
        .collect();

    let mut quoted = String::with_capacity(cleaned.len() + 2);
    quoted.push('"');
    for c in cleaned.trim().chars() {
        if matches!(c, '\\' | '"') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn display_company(tenant: &TenantConfig) -> &str {
    if tenant.company_name.trim().is_empty() {
        &tenant.key
    } else {
        &tenant.company_name
    }
}
