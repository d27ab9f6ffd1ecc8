//! Call transcript log
//!
//! Append-only during the call, sealed into an immutable [`Transcript`] at
//! the end and persisted once.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Who produced a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// The primary caller
    Caller,
    /// The assistant
    Agent,
    /// Someone else audible on the caller's side
    Bystander,
    /// Side effects worth keeping (an SMS was sent, a timeout)
    System,
}

impl TranscriptRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "Caller",
            Self::Agent => "Agent",
            Self::Bystander => "Bystander",
            Self::System => "System",
        }
    }
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Elapsed call time as `MM:SS`
    pub label: String,
    pub role: TranscriptRole,
    /// Diarized speaker id, when known
    pub speaker: Option<u32>,
    pub text: String,
}

/// Derived transcript statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranscriptStats {
    pub caller_turns: usize,
    pub agent_turns: usize,
    pub bystander_turns: usize,
    pub distinct_speakers: usize,
    pub duration: Duration,
}

/// Format elapsed time as `MM:SS`
#[must_use]
pub fn elapsed_label(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Accumulates transcript lines for a live call
#[derive(Debug)]
pub struct TranscriptBuilder {
    call_id: String,
    stream_id: String,
    caller_phone: Option<String>,
    started_at: DateTime<Utc>,
    clock: Instant,
    last_offset: Duration,
    entries: Vec<TranscriptEntry>,
}

impl TranscriptBuilder {
    #[must_use]
    pub fn new(call_id: &str, stream_id: &str, caller_phone: Option<String>) -> Self {
        Self {
            call_id: call_id.to_string(),
            stream_id: stream_id.to_string(),
            caller_phone,
            started_at: Utc::now(),
            clock: Instant::now(),
            last_offset: Duration::ZERO,
            entries: Vec::new(),
        }
    }

    /// Append a line stamped with the time since the call started
    pub fn record(&mut self, role: TranscriptRole, speaker: Option<u32>, text: &str) {
        let elapsed = self.clock.elapsed();
        self.append(elapsed, role, speaker, text);
    }

    /// Append a line at an explicit offset
    pub fn append(&mut self, elapsed: Duration, role: TranscriptRole, speaker: Option<u32>, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.last_offset = self.last_offset.max(elapsed);
        self.entries.push(TranscriptEntry {
            label: elapsed_label(elapsed),
            role,
            speaker,
            text: text.to_string(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Fewer than two lines is not worth persisting
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.entries.len() < 2
    }

    #[must_use]
    pub fn stats(&self) -> TranscriptStats {
        let count = |role| self.entries.iter().filter(|e| e.role == role).count();
        let speakers: BTreeSet<u32> = self.entries.iter().filter_map(|e| e.speaker).collect();

        TranscriptStats {
            caller_turns: count(TranscriptRole::Caller),
            agent_turns: count(TranscriptRole::Agent),
            bystander_turns: count(TranscriptRole::Bystander),
            distinct_speakers: speakers.len(),
            duration: self.clock.elapsed().max(self.last_offset),
        }
    }

    /// Seal the log
    #[must_use]
    pub fn finish(self) -> Transcript {
        let duration = self.stats().duration;
        Transcript {
            call_id: self.call_id,
            stream_id: self.stream_id,
            caller_phone: self.caller_phone,
            started_at: self.started_at,
            duration_secs: duration.as_secs(),
            entries: self.entries,
        }
    }
}

/// A sealed call transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub call_id: String,
    pub stream_id: String,
    pub caller_phone: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Human-readable rendering, one `[MM:SS] Role: text` line per entry
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "[{}] {}: {}", entry.label, entry.role.as_str(), entry.text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_minutes_and_seconds() {
        assert_eq!(elapsed_label(Duration::from_secs(0)), "00:00");
        assert_eq!(elapsed_label(Duration::from_secs(75)), "01:15");
        assert_eq!(elapsed_label(Duration::from_millis(3_599_999)), "59:59");
    }

    #[tokio::test]
    async fn stats_count_roles_and_speakers() {
        let mut builder = TranscriptBuilder::new("call-1", "stream-1", None);
        builder.append(Duration::from_secs(1), TranscriptRole::Agent, None, "Hello!");
        builder.append(Duration::from_secs(3), TranscriptRole::Caller, Some(0), "Hi there");
        builder.append(Duration::from_secs(4), TranscriptRole::Bystander, Some(1), "who is it");
        builder.append(Duration::from_secs(9), TranscriptRole::Caller, Some(0), "Question");
        builder.append(Duration::from_secs(10), TranscriptRole::Caller, None, "   ");

        let stats = builder.stats();
        assert_eq!(stats.caller_turns, 2);
        assert_eq!(stats.agent_turns, 1);
        assert_eq!(stats.bystander_turns, 1);
        assert_eq!(stats.distinct_speakers, 2);
        assert!(stats.duration >= Duration::from_secs(9));
    }

    #[tokio::test]
    async fn trivial_until_two_entries() {
        let mut builder = TranscriptBuilder::new("call-1", "stream-1", None);
        assert!(builder.is_trivial());
        builder.record(TranscriptRole::Agent, None, "Hello!");
        assert!(builder.is_trivial());
        builder.record(TranscriptRole::Caller, Some(0), "Hey");
        assert!(!builder.is_trivial());

        let transcript = builder.finish();
        assert!(transcript.render().contains("Caller: Hey"));
    }
}
