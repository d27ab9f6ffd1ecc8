//! Primary speaker tracking for diarized calls
//!
//! The first attributed speaker on a call becomes the primary and stays
//! frozen for the rest of the call. Anyone else is a bystander (a TV, a
//! second person in the room) whose speech is logged but never answered.

use std::time::Instant;

/// One attributed utterance
#[derive(Debug, Clone, Copy)]
pub struct SpeakerTurn {
    pub speaker: u32,
    pub at: Instant,
    pub word_count: usize,
}

/// Tracks who the primary speaker is on a call
#[derive(Debug, Default)]
pub struct SpeakerTracker {
    primary: Option<u32>,
    history: Vec<SpeakerTurn>,
    bystander_detected: bool,
}

impl SpeakerTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an utterance and report whether it came from the primary speaker
    ///
    /// A missing speaker id is treated as primary.
    pub fn register(&mut self, speaker: Option<u32>, word_count: usize) -> bool {
        let Some(speaker) = speaker else {
            return true;
        };

        let primary = *self.primary.get_or_insert(speaker);
        self.history.push(SpeakerTurn {
            speaker,
            at: Instant::now(),
            word_count,
        });

        if speaker == primary {
            true
        } else {
            if !self.bystander_detected {
                tracing::info!(primary, bystander = speaker, "bystander speech detected");
                self.bystander_detected = true;
            }
            false
        }
    }

    /// Whether a primary is set and the id differs from it
    #[must_use]
    pub fn is_bystander(&self, speaker: Option<u32>) -> bool {
        matches!((self.primary, speaker), (Some(p), Some(s)) if p != s)
    }

    #[must_use]
    pub const fn primary(&self) -> Option<u32> {
        self.primary
    }

    #[must_use]
    pub const fn bystander_detected(&self) -> bool {
        self.bystander_detected
    }

    #[must_use]
    pub fn history(&self) -> &[SpeakerTurn] {
        &self.history
    }

    /// Words attributed to a given speaker so far
    #[must_use]
    pub fn words_from(&self, speaker: u32) -> usize {
        self.history
            .iter()
            .filter(|t| t.speaker == speaker)
            .map(|t| t.word_count)
            .sum()
    }
}
