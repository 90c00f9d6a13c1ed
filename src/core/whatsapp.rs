use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::config::TwilioSettings;
use super::errors::CoreError;
use super::notifications::{Channel, Notifier, OutgoingMessage};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

/// WhatsApp messages through the Twilio Messages API.
pub struct TwilioWhatsAppNotifier {
    client: Client,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioWhatsAppNotifier {
    pub fn new(client: Client, settings: &TwilioSettings) -> Self {
        Self {
            client,
            account_sid: settings.account_sid.clone(),
            auth_token: settings.auth_token.clone(),
            from: whatsapp_address(&settings.whatsapp_from),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{TWILIO_API_BASE}/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioWhatsAppNotifier {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> anyhow::Result<String> {
        let to = whatsapp_address(recipient);
        let form = [
            ("To", to.as_str()),
            ("From", self.from.as_str()),
            ("Body", message.body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CoreError::NotificationApi {
                channel: Channel::WhatsApp.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let created = serde_json::from_str::<MessageResponse>(&body)
            .context("failed to parse Twilio message response")?;
        Ok(created.sid.unwrap_or_default())
    }
}

/// `whatsapp:+<digits>` form Twilio expects. Numbers without a leading `+`
/// are assumed to already include their country code.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with("whatsapp:") {
        return number.to_string();
    }

    let number: String = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if number.starts_with('+') {
        format!("whatsapp:{number}")
    } else {
        warn!("Phone number {number} should start with '+' for international format");
        format!("whatsapp:+{number}")
    }
}
