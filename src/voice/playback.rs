//! Audio playback into the call's media stream
//!
//! Synthesized audio is paced out in fixed-size frames. The shared
//! `is_playing` flag is checked before every frame, so a barge-in stops
//! playback within one frame interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;

use super::tts::SpeechSynthesizer;
use crate::Result;

/// Bytes per outbound frame (40ms of 8kHz μ-law)
pub const FRAME_BYTES: usize = 320;

/// Pause between outbound frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(15);

/// Downstream half of a call's media stream
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Send one frame of μ-law audio to the caller
    async fn send_audio(&self, frame: &[u8]) -> Result<()>;

    /// Ask the carrier to drop any audio it has buffered
    async fn clear(&self) -> Result<()>;
}

/// How a `speak` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All audio was sent
    Completed,
    /// Playback was cancelled part-way through
    Interrupted,
}

// Clears the playing flag even when the speaking task is aborted
struct PlayingFlag<'a>(&'a AtomicBool);

impl Drop for PlayingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Streams synthesized speech to one call
pub struct PlaybackController {
    synth: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn MediaSink>,
    playing: Arc<AtomicBool>,
    // One playback stream per call at a time
    gate: Mutex<()>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            synth,
            sink,
            playing: Arc::new(AtomicBool::new(false)),
            gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Stop playback at the next frame boundary
    ///
    /// Returns whether anything was playing.
    pub fn cancel(&self) -> bool {
        self.playing.swap(false, Ordering::SeqCst)
    }

    /// The media sink this controller writes to
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn MediaSink> {
        &self.sink
    }

    /// Synthesize and stream `text`
    ///
    /// The playing flag is set for the duration and cleared on completion,
    /// cancellation or error.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the media sink is gone
    pub async fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        if text.trim().is_empty() {
            return Ok(PlaybackOutcome::Completed);
        }

        let _gate = self.gate.lock().await;
        self.playing.store(true, Ordering::SeqCst);
        let playing = PlayingFlag(&self.playing);
        let result = self.stream_frames(text).await;
        drop(playing);

        if let Ok(outcome) = &result {
            tracing::debug!(?outcome, chars = text.len(), "playback finished");
        }
        result
    }

    async fn stream_frames(&self, text: &str) -> Result<PlaybackOutcome> {
        let mut audio = self.synth.synthesize(text).await?;
        let mut pending: Vec<u8> = Vec::with_capacity(FRAME_BYTES * 4);
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while let Some(chunk) = audio.next().await {
            pending.extend_from_slice(&chunk?);
            while pending.len() >= FRAME_BYTES {
                if !self.send_frame(&mut ticker, &pending[..FRAME_BYTES]).await? {
                    return Ok(PlaybackOutcome::Interrupted);
                }
                pending.drain(..FRAME_BYTES);
            }
            if !self.is_playing() {
                return Ok(PlaybackOutcome::Interrupted);
            }
        }

        if !pending.is_empty() && !self.send_frame(&mut ticker, &pending).await? {
            return Ok(PlaybackOutcome::Interrupted);
        }

        Ok(PlaybackOutcome::Completed)
    }

    /// Wait for the next frame slot and send; false if cancelled meanwhile
    async fn send_frame(&self, ticker: &mut tokio::time::Interval, frame: &[u8]) -> Result<bool> {
        if !self.is_playing() {
            return Ok(false);
        }
        ticker.tick().await;
        if !self.is_playing() {
            return Ok(false);
        }
        self.sink.send_audio(frame).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::voice::AudioStream;

    struct ToneSynth {
        bytes: usize,
    }

    #[async_trait]
    impl SpeechSynthesizer for ToneSynth {
        async fn synthesize(&self, _text: &str) -> Result<AudioStream> {
            // Deliberately uneven chunking
            let chunks: Vec<Result<Vec<u8>>> = vec![0xFFu8; self.bytes]
                .chunks(500)
                .map(|c| Ok(c.to_vec()))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl MediaSink for RecordingSink {
        async fn send_audio(&self, frame: &[u8]) -> Result<()> {
            self.frames.lock().unwrap().push(frame.len());
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn speaks_in_fixed_frames() {
        let sink = Arc::new(RecordingSink::default());
        let playback = PlaybackController::new(Arc::new(ToneSynth { bytes: 1000 }), sink.clone());

        let outcome = playback.speak("hello").await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(!playback.is_playing());
        assert_eq!(*sink.frames.lock().unwrap(), vec![320, 320, 320, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_within_one_frame() {
        let sink = Arc::new(RecordingSink::default());
        let playback = Arc::new(PlaybackController::new(
            Arc::new(ToneSynth { bytes: 320 * 100 }),
            sink.clone(),
        ));

        let speaker = {
            let playback = Arc::clone(&playback);
            tokio::spawn(async move { playback.speak("a long reply").await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(playback.is_playing());
        assert!(playback.cancel());
        assert!(!playback.is_playing());

        let sent_at_cancel = sink.frames.lock().unwrap().len();
        let outcome = speaker.await.unwrap().unwrap();
        assert_eq!(outcome, PlaybackOutcome::Interrupted);
        assert!(sink.frames.lock().unwrap().len() <= sent_at_cancel + 1);
        assert!(sent_at_cancel < 100);
    }

    #[tokio::test]
    async fn blank_text_is_a_no_op() {
        let sink = Arc::new(RecordingSink::default());
        let playback = PlaybackController::new(Arc::new(ToneSynth { bytes: 640 }), sink.clone());
        assert_eq!(playback.speak("  ").await.unwrap(), PlaybackOutcome::Completed);
        assert!(sink.frames.lock().unwrap().is_empty());
    }
}
