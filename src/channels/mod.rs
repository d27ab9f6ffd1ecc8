//! Outbound messaging channels
//!
//! Side effects the gateway fires during and after calls: SMS to callers and
//! the owner, email as the fallback. Failures are reported in the receipt,
//! never raised, so teardown paths cannot crash on them.

mod resend;
mod twilio;

use async_trait::async_trait;

pub use resend::ResendEmail;
pub use twilio::TwilioSms;

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendReceipt {
    pub success: bool,
    /// Provider message id
    pub id: Option<String>,
}

impl SendReceipt {
    #[must_use]
    pub const fn sent(id: Option<String>) -> Self {
        Self { success: true, id }
    }

    #[must_use]
    pub const fn failed() -> Self {
        Self {
            success: false,
            id: None,
        }
    }
}

/// Outbound text and email delivery
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Send an SMS
    async fn send_text(&self, to: &str, body: &str) -> SendReceipt;

    /// Send an HTML email
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> SendReceipt;
}

/// SMS and email adapters behind one channel; either may be unconfigured
#[derive(Default)]
pub struct OutboundChannels {
    sms: Option<TwilioSms>,
    email: Option<ResendEmail>,
}

impl OutboundChannels {
    #[must_use]
    pub const fn new(sms: Option<TwilioSms>, email: Option<ResendEmail>) -> Self {
        Self { sms, email }
    }

    #[must_use]
    pub const fn has_sms(&self) -> bool {
        self.sms.is_some()
    }

    #[must_use]
    pub const fn has_email(&self) -> bool {
        self.email.is_some()
    }
}

#[async_trait]
impl OutboundChannel for OutboundChannels {
    async fn send_text(&self, to: &str, body: &str) -> SendReceipt {
        let Some(sms) = &self.sms else {
            tracing::debug!("SMS not configured, skipping send");
            return SendReceipt::failed();
        };
        match sms.send(to, body).await {
            Ok(id) => SendReceipt::sent(id),
            Err(e) => {
                tracing::warn!(error = %e, "SMS send failed");
                SendReceipt::failed()
            }
        }
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> SendReceipt {
        let Some(email) = &self.email else {
            tracing::debug!("email not configured, skipping send");
            return SendReceipt::failed();
        };
        match email.send(to, subject, html).await {
            Ok(id) => SendReceipt::sent(id),
            Err(e) => {
                tracing::warn!(error = %e, "email send failed");
                SendReceipt::failed()
            }
        }
    }
}
