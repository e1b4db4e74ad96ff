//! Inbound webhook payload types.
//!
//! The webhook body follows the Postmark inbound JSON format, so field
//! names are PascalCase on the wire.

use serde::{Deserialize, Serialize};

/// One email delivered to a gateway address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundEmailEvent {
    /// Sender address, possibly wrapped as `"Name" <addr>`
    #[serde(default)]
    pub from: String,
    /// Sender display name
    #[serde(default)]
    pub from_name: String,
    /// Recipient header value (may list several addresses)
    #[serde(default)]
    pub to: String,
    /// Envelope recipient, preferred over `To` when present
    #[serde(default)]
    pub original_recipient: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

/// Attachment exactly as received: base64 content, nothing decoded yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAttachment {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: String,
}

impl InboundEmailEvent {
    /// Address used to resolve the tenant.
    pub fn recipient(&self) -> String {
        let raw = self
            .original_recipient
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(&self.to);
        bare_address(first_address(raw))
    }

    /// Bare sender address.
    pub fn sender_address(&self) -> String {
        bare_address(&self.from)
    }

    /// Display name if the sender supplied one, otherwise their address.
    pub fn sender_label(&self) -> String {
        let name = self.from_name.trim().trim_matches('"').trim();
        if name.is_empty() {
            self.sender_address()
        } else {
            name.to_string()
        }
    }

    /// Domain part of the sender address, lower-cased.
    pub fn sender_domain(&self) -> Option<String> {
        let address = self.sender_address();
        address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_lowercase())
            .filter(|d| !d.is_empty())
    }
}

/// First entry of an address list. Commas inside quoted display names or
/// angle brackets do not separate entries.
fn first_address(list: &str) -> &str {
    let mut quoted = false;
    let mut escaped = false;
    let mut in_angle = false;
    for (i, c) in list.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => in_angle = true,
            '>' if !quoted => in_angle = false,
            ',' if !quoted && !in_angle => return &list[..i],
            _ => {}
        }
    }
    list
}

/// Strip a display-name wrapper: `"Jane" <jane@x.com>` → `jane@x.com`.
fn bare_address(raw: &str) -> String {
    let raw = raw.trim();
    match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => raw[start + 1..end].trim().to_string(),
        _ => raw.to_string(),
    }
}
