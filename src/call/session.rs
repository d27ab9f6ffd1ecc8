//! Per-call mutable state

use tokio::time::Instant;

use super::identity::CallerIdentity;
use super::transcript::{Transcript, TranscriptBuilder, TranscriptRole, TranscriptStats};
use crate::prompt::truncate_chars;
use crate::providers::ChatTurn;
use crate::steering::Touchpoints;
use crate::voice::{SpeakerTracker, TurnTaker};

/// Caller lines quoted in the cross-call summary
const SUMMARY_RECENT_LINES: usize = 2;

/// Topic excerpt length in the cross-call summary
const SUMMARY_TOPIC_CHARS: usize = 80;

/// Everything that changes while a call is live
#[derive(Debug)]
pub struct CallSession {
    pub call_id: String,
    pub stream_id: String,
    pub caller_phone: Option<String>,
    pub identity: CallerIdentity,
    pub touchpoints: Touchpoints,
    /// Summary of the caller's previous call, if any
    pub prior_summary: Option<String>,
    /// Conversation as the model sees it
    pub turns: Vec<ChatTurn>,
    pub turn_taker: TurnTaker,
    pub speakers: SpeakerTracker,
    pub transcript: TranscriptBuilder,
    pub last_speech: Option<Instant>,
    pub ended: bool,
}

impl CallSession {
    #[must_use]
    pub fn new(
        call_id: &str,
        stream_id: &str,
        caller_phone: Option<String>,
        identity: CallerIdentity,
        touchpoints: Touchpoints,
    ) -> Self {
        Self {
            call_id: call_id.to_string(),
            stream_id: stream_id.to_string(),
            transcript: TranscriptBuilder::new(call_id, stream_id, caller_phone.clone()),
            caller_phone,
            prior_summary: identity.history().map(ToString::to_string),
            identity,
            touchpoints,
            turns: Vec::new(),
            turn_taker: TurnTaker::new(),
            speakers: SpeakerTracker::new(),
            last_speech: None,
            ended: false,
        }
    }

    /// Caller's name as best known: spoken, then directory
    #[must_use]
    pub fn caller_name(&self) -> Option<&str> {
        self.touchpoints
            .caller_name
            .as_deref()
            .or(self.identity.display_name.as_deref())
    }

    /// Human label for the caller in summaries
    #[must_use]
    pub fn caller_label(&self) -> String {
        match (self.caller_name(), self.caller_phone.as_deref()) {
            (Some(name), Some(phone)) => format!("{name} ({phone})"),
            (Some(name), None) => name.to_string(),
            (None, Some(phone)) => phone.to_string(),
            (None, None) => "an unknown caller".to_string(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> TranscriptStats {
        self.transcript.stats()
    }

    /// Condensed summary stored per phone number for the next call
    #[must_use]
    pub fn summary(&self) -> String {
        let caller_lines: Vec<&str> = self
            .transcript
            .entries()
            .iter()
            .filter(|e| e.role == TranscriptRole::Caller)
            .map(|e| e.text.as_str())
            .collect();

        let topic = caller_lines
            .iter()
            .find(|line| line.split_whitespace().count() > 3)
            .or_else(|| caller_lines.first());

        let mut parts = Vec::new();
        parts.push(match topic {
            Some(topic) => format!(
                "We talked about \"{}\".",
                truncate_chars(topic, SUMMARY_TOPIC_CHARS)
            ),
            None => "We spoke briefly.".to_string(),
        });

        if let Some(name) = self.caller_name() {
            parts.push(format!("Caller: {name}."));
        }

        let covered: Vec<&str> = self
            .touchpoints
            .state()
            .covered()
            .iter()
            .map(|t| t.as_str())
            .collect();
        if !covered.is_empty() {
            parts.push(format!("Covered: {}.", covered.join(", ")));
        }

        let recent: Vec<String> = caller_lines
            .iter()
            .rev()
            .take(SUMMARY_RECENT_LINES)
            .rev()
            .map(|line| format!("\"{}\"", truncate_chars(line, SUMMARY_TOPIC_CHARS)))
            .collect();
        if !recent.is_empty() {
            parts.push(format!("Last said: {}.", recent.join(" / ")));
        }

        if let Some(words) = self.bystander_words() {
            parts.push(format!("Background speech: {words} words, not answered."));
        }

        let stats = self.stats();
        parts.push(format!(
            "Turns: caller {}, agent {}.",
            stats.caller_turns, stats.agent_turns
        ));

        parts.join(" ")
    }

    /// Words heard from anyone other than the primary speaker, once a
    /// bystander has been detected
    #[must_use]
    pub fn bystander_words(&self) -> Option<usize> {
        if !self.speakers.bystander_detected() {
            return None;
        }
        let primary = self.speakers.primary()?;
        let total: usize = self.speakers.history().iter().map(|t| t.word_count).sum();
        Some(total - self.speakers.words_from(primary))
    }

    /// Seal the transcript, leaving an empty log behind
    pub fn seal_transcript(&mut self) -> Transcript {
        let fresh = TranscriptBuilder::new(&self.call_id, &self.stream_id, self.caller_phone.clone());
        std::mem::replace(&mut self.transcript, fresh).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steering::{CallerCategory, Touchpoint, TouchpointState};

    fn session() -> CallSession {
        let identity = CallerIdentity::unknown(Some("+15551234567".into()));
        let touchpoints = Touchpoints::new(TouchpointState::for_category(CallerCategory::FirstTime));
        CallSession::new("CA1", "MZ1", Some("+15551234567".into()), identity, touchpoints)
    }

    #[tokio::test]
    async fn summary_condenses_the_call() {
        let mut session = session();
        session.touchpoints.caller_name = Some("Sam".into());
        session.touchpoints.mark(Touchpoint::Portal);
        session.transcript.record(TranscriptRole::Agent, None, "Hi, thanks for calling!");
        session.transcript.record(TranscriptRole::Caller, Some(0), "hi");
        session.transcript.record(TranscriptRole::Caller, Some(0), "I need a quote for a kitchen remodel");
        session.transcript.record(TranscriptRole::Caller, Some(0), "thanks bye");

        let summary = session.summary();
        assert!(summary.starts_with("We talked about \"I need a quote for a kitchen remodel\"."));
        assert!(summary.contains("Caller: Sam."));
        assert!(summary.contains("Covered: PORTAL."));
        assert!(summary.contains("Last said: \"I need a quote for a kitchen remodel\" / \"thanks bye\"."));
        assert!(summary.ends_with("Turns: caller 3, agent 1."));
        assert_eq!(session.caller_label(), "Sam (+15551234567)");
    }

    #[tokio::test]
    async fn summary_notes_background_speech() {
        let mut session = session();
        assert_eq!(session.bystander_words(), None);

        session.speakers.register(Some(0), 6);
        session.transcript.record(TranscriptRole::Caller, Some(0), "I need a quote for a remodel");
        session.speakers.register(Some(1), 4);
        session.speakers.register(Some(0), 2);
        session.speakers.register(Some(2), 1);

        assert_eq!(session.bystander_words(), Some(5));
        let summary = session.summary();
        assert!(summary.contains("Background speech: 5 words, not answered."));
        assert!(summary.ends_with("Turns: caller 1, agent 0."));
    }

    #[tokio::test]
    async fn sealing_empties_the_log() {
        let mut session = session();
        session.transcript.record(TranscriptRole::Caller, None, "hello");
        let transcript = session.seal_transcript();
        assert_eq!(transcript.entries.len(), 1);
        assert!(session.transcript.entries().is_empty());
        assert_eq!(session.summary(), "We spoke briefly. Turns: caller 0, agent 0.");
    }
}
