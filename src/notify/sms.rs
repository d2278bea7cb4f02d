//! SMS gateway channel
//!
//! Speaks the bulk-messaging form API used by African SMS aggregators:
//! `POST` a form with `username`, `to`, `message` and optionally `from`,
//! authenticated by an `apiKey` header.

use super::{DeliveryRecord, NotificationChannel, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SmsGatewayChannel {
    client: Client,
    api_url: String,
    api_key: String,
    username: String,
    sender_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    data: MessageData,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Recipients", default)]
    recipients: Vec<RecipientStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientStatus {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    number: Option<String>,
    status: String,
}

impl SmsGatewayChannel {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        username: impl Into<String>,
        sender_id: Option<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            username: username.into(),
            sender_id,
        })
    }

    fn form<'a>(&'a self, recipient: &'a str, message: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![
            ("username", self.username.as_str()),
            ("to", recipient),
            ("message", message),
        ];
        if let Some(from) = &self.sender_id {
            form.push(("from", from.as_str()));
        }
        form
    }
}

/// Turn a gateway answer into a delivery record for `recipient`
fn parse_delivery(recipient: &str, body: &str) -> Result<DeliveryRecord, NotifyError> {
    let parsed: SendResponse = serde_json::from_str(body)
        .map_err(|e| NotifyError::Rejected(format!("Unreadable gateway response: {e}")))?;

    let Some(first) = parsed.data.recipients.into_iter().next() else {
        return Err(NotifyError::Rejected(if parsed.data.message.is_empty() {
            "No recipients accepted".to_string()
        } else {
            parsed.data.message
        }));
    };

    Ok(DeliveryRecord {
        message_id: first
            .message_id
            .filter(|id| !id.is_empty() && id != "None")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        recipient: first.number.unwrap_or_else(|| recipient.to_string()),
        status: first.status,
    })
}

#[async_trait]
impl NotificationChannel for SmsGatewayChannel {
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryRecord, NotifyError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&self.form(recipient, message))
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("{status}: {body}")));
        }
        parse_delivery(recipient, &body)
    }
}
