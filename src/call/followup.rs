//! Post-call follow-up to the owner
//!
//! Text first, email once if the text fails, and a `followup_failure` memory
//! record if both fail. Runs detached from call teardown.

use crate::channels::OutboundChannel;
use crate::config::OwnerConfig;
use crate::db::{CATEGORY_FOLLOWUP_FAILURE, MemoryRecord, MemoryStore};

/// What to tell the owner about a finished call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub call_id: String,
    /// Name and/or number of the caller
    pub caller: String,
    pub summary: String,
}

/// How a follow-up ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpOutcome {
    Texted,
    Emailed,
    /// Both attempts failed; a failure record was written (or attempted)
    Failed,
    /// No owner phone or email configured
    Skipped,
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Deliver a follow-up; never fails
pub async fn send_followup(
    channel: &dyn OutboundChannel,
    memory: &dyn MemoryStore,
    owner: &OwnerConfig,
    followup: &FollowUp,
) -> FollowUpOutcome {
    if owner.phone.is_none() && owner.email.is_none() {
        tracing::debug!(call_id = %followup.call_id, "no owner contact configured, skipping follow-up");
        return FollowUpOutcome::Skipped;
    }

    if let Some(phone) = owner.phone.as_deref() {
        let body = format!("Call from {}: {}", followup.caller, followup.summary);
        if channel.send_text(phone, &body).await.success {
            tracing::info!(call_id = %followup.call_id, "follow-up texted to owner");
            return FollowUpOutcome::Texted;
        }
        tracing::warn!(call_id = %followup.call_id, "follow-up SMS failed, trying email");
    }

    if let Some(email) = owner.email.as_deref() {
        let subject = format!("Call from {}", followup.caller);
        let html = format!(
            "<p><strong>Call from {}</strong></p><p>{}</p><p><small>Call {}</small></p>",
            escape_html(&followup.caller),
            escape_html(&followup.summary),
            escape_html(&followup.call_id)
        );
        if channel.send_email(email, &subject, &html).await.success {
            tracing::info!(call_id = %followup.call_id, "follow-up emailed to owner");
            return FollowUpOutcome::Emailed;
        }
    }

    tracing::warn!(call_id = %followup.call_id, "follow-up delivery failed, recording for review");
    let record = MemoryRecord::new(
        CATEGORY_FOLLOWUP_FAILURE,
        &followup.call_id,
        &format!("Follow-up for call from {} failed: {}", followup.caller, followup.summary),
    )
    .with_importance(8);
    if let Err(e) = memory.insert(record).await {
        tracing::error!(call_id = %followup.call_id, error = %e, "failed to record follow-up failure");
    }
    FollowUpOutcome::Failed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<b>Tom & \"Jerry\"</b>"), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    }
}
