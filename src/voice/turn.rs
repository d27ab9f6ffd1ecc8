//! Turn-taking: utterance accumulation, endpoint debounce and response pacing
//!
//! `TurnTaker` owns the per-call phase (`Idle → Accumulating → Dispatching →
//! Idle`) and the buffer of caller speech waiting to be answered. The timing
//! helpers compute how long to wait for more speech and how long to pause
//! before the agent replies.

use std::time::Duration;

use serde::Deserialize;

/// Pacing knobs for endpoint debounce and reply delay
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Base wait after a final utterance before dispatching
    pub debounce_ms: u64,
    /// Extra wait for short utterances early in the call
    pub early_short_extra_ms: u64,
    /// Extra wait after a long agent reply
    pub long_reply_extra_ms: u64,
    /// Upper bound on the debounce
    pub debounce_max_ms: u64,
    /// Base pause before the agent starts speaking
    pub response_delay_ms: u64,
    /// Pause after the caller asked a question
    pub question_delay_ms: u64,
    /// Pause for a terse back-and-forth
    pub terse_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 700,
            early_short_extra_ms: 300,
            long_reply_extra_ms: 250,
            debounce_max_ms: 1500,
            response_delay_ms: 250,
            question_delay_ms: 600,
            terse_delay_ms: 150,
        }
    }
}

/// Turns up to which the call counts as "early"
const EARLY_TURNS: u32 = 2;

/// Utterances at or under this many words count as short
const SHORT_UTTERANCE_WORDS: usize = 3;

/// Agent replies over this many words count as long
const LONG_REPLY_WORDS: usize = 40;

/// How long to wait for more caller speech before dispatching.
///
/// Longer on short early-call turns (callers pause while orienting) and after
/// unusually long agent replies (callers take a beat to absorb them).
#[must_use]
pub fn debounce_interval(
    pacing: &PacingConfig,
    turn: u32,
    utterance_words: usize,
    last_reply_words: usize,
) -> Duration {
    let mut ms = pacing.debounce_ms;
    if turn <= EARLY_TURNS && utterance_words <= SHORT_UTTERANCE_WORDS {
        ms += pacing.early_short_extra_ms;
    }
    if last_reply_words > LONG_REPLY_WORDS {
        ms += pacing.long_reply_extra_ms;
    }
    Duration::from_millis(ms.min(pacing.debounce_max_ms))
}

/// Pause before the agent reply starts playing.
///
/// Questions earn a longer, more considered pause; terse exchanges (short
/// utterance and short reply) a shorter one.
#[must_use]
pub fn response_delay(
    pacing: &PacingConfig,
    caller_asked_question: bool,
    utterance_words: usize,
    reply_words: usize,
) -> Duration {
    let ms = if caller_asked_question {
        pacing.question_delay_ms
    } else if utterance_words <= SHORT_UTTERANCE_WORDS && reply_words <= 12 {
        pacing.terse_delay_ms
    } else {
        pacing.response_delay_ms
    };
    Duration::from_millis(ms)
}

/// Turn phase of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// Nothing buffered, nothing in flight
    #[default]
    Idle,
    /// Caller speech buffered, debounce running
    Accumulating,
    /// An agent turn is in flight
    Dispatching,
}

/// Accumulates caller speech and gates dispatch
#[derive(Debug, Default)]
pub struct TurnTaker {
    phase: TurnPhase,
    buffer: Vec<String>,
    last_reply_words: usize,
}

impl TurnTaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Append a final primary utterance to the buffer
    ///
    /// While dispatching the phase does not change; the text waits for the
    /// next cycle.
    pub fn push_final(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.buffer.push(text.to_string());
        if self.phase == TurnPhase::Idle {
            self.phase = TurnPhase::Accumulating;
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Words currently buffered
    #[must_use]
    pub fn pending_words(&self) -> usize {
        self.buffer.iter().map(|t| t.split_whitespace().count()).sum()
    }

    /// Drain the buffer into one utterance and enter `Dispatching`
    ///
    /// Returns `None` if a dispatch is already in flight or nothing is buffered.
    pub fn take_for_dispatch(&mut self) -> Option<String> {
        if self.phase == TurnPhase::Dispatching || self.buffer.is_empty() {
            return None;
        }
        let utterance = self.buffer.join(" ");
        self.buffer.clear();
        self.phase = TurnPhase::Dispatching;
        Some(utterance)
    }

    /// Leave `Dispatching`, remembering the reply length for pacing
    pub fn finish_dispatch(&mut self, reply_words: usize) {
        self.last_reply_words = reply_words;
        self.phase = if self.buffer.is_empty() {
            TurnPhase::Idle
        } else {
            TurnPhase::Accumulating
        };
    }

    #[must_use]
    pub const fn last_reply_words(&self) -> usize {
        self.last_reply_words
    }
}
