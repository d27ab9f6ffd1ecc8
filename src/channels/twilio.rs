//! Twilio SMS via the Messages REST API

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Twilio REST client for outbound SMS
pub struct TwilioSms {
    client: Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

impl TwilioSms {
    /// Create a new Twilio SMS client
    ///
    /// # Errors
    ///
    /// Returns error if any credential is empty
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Result<Self> {
        if account_sid.is_empty() || auth_token.is_empty() || from_number.is_empty() {
            return Err(Error::Config(
                "Twilio account SID, auth token and from number are required".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            account_sid,
            auth_token: SecretString::from(auth_token),
            from_number,
        })
    }

    fn messages_url(&self) -> String {
        format!("{API_BASE}/Accounts/{}/Messages.json", self.account_sid)
    }

    /// Send an SMS, returning the message SID
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Twilio rejects it
    pub async fn send(&self, to: &str, body: &str) -> Result<Option<String>> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!("Twilio API error: {status} - {body}")));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Twilio response parse error: {e}")))?;

        tracing::info!(sid = ?message.sid, "SMS sent");
        Ok(message.sid)
    }
}
