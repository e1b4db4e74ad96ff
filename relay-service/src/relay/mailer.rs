//! Outbound mail transmission.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::assembler::OutboundMessage;
use crate::error::{preview, RelayError};

/// Mail provider capability. Returns the provider's message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<String, RelayError>;
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    reply_to: &'a str,
    subject: &'a str,
    text: &'a str,
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Deserialize)]
struct ResendAccepted {
    #[serde(default)]
    id: String,
}

/// [Resend](https://resend.com/docs/api-reference/emails/send-email) HTTP client.
#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ResendMailer {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

fn encode(message: &OutboundMessage) -> ResendEmail<'_> {
    ResendEmail {
        from: &message.from,
        to: [&message.to],
        reply_to: &message.reply_to,
        subject: &message.subject,
        text: &message.text_body,
        attachments: message
            .attachments
            .iter()
            .map(|a| ResendAttachment {
                filename: &a.file_name,
                content: STANDARD.encode(&a.content),
                content_type: &a.content_type,
            })
            .collect(),
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<String, RelayError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&encode(message))
            .send()
            .await
            .map_err(|e| {
                error!(to = %message.to, error = %e, "relay_send_request_failed");
                RelayError::RelayTransmission(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                to = %message.to,
                status_code = status.as_u16(),
                body = %preview(&body),
                "relay_send_rejected"
            );
            return Err(RelayError::RelayTransmission(format!(
                "mail provider returned {}: {}",
                status,
                preview(&body)
            )));
        }

        let accepted: ResendAccepted = response
            .json()
            .await
            .map_err(|e| RelayError::RelayTransmission(format!("unreadable provider reply: {e}")))?;

        info!(
            to = %message.to,
            provider_id = %accepted.id,
            attachments = message.attachments.len(),
            "relay_sent"
        );

        Ok(accepted.id)
    }
}
