//! Resend transactional email

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const API_URL: &str = "https://api.resend.com/emails";

/// Resend REST client
pub struct ResendEmail {
    client: Client,
    api_key: SecretString,
    from: String,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct EmailResponse {
    id: Option<String>,
}

impl ResendEmail {
    /// Create a new Resend client
    ///
    /// # Errors
    ///
    /// Returns error if the API key or sender is empty
    pub fn new(api_key: String, from: String) -> Result<Self> {
        if api_key.is_empty() || from.is_empty() {
            return Err(Error::Config("Resend API key and sender address required".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            api_key: SecretString::from(api_key),
            from,
        })
    }

    /// Send an email, returning the message id
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Resend rejects it
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<Option<String>> {
        let request = EmailRequest {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Resend request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!("Resend API error: {status} - {body}")));
        }

        let email: EmailResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Resend response parse error: {e}")))?;

        tracing::info!(id = ?email.id, "email sent");
        Ok(email.id)
    }
}
