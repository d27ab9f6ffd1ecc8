//! Voice processing module
//!
//! Streaming STT decoding, speaker tracking, turn-taking, TTS and paced
//! playback into the carrier media stream.

pub mod codec;
mod playback;
mod speaker;
mod stt;
mod tts;
mod turn;

pub use codec::{PcmTranscoder, linear_to_ulaw};
pub use playback::{FRAME_BYTES, FRAME_INTERVAL, MediaSink, PlaybackController, PlaybackOutcome};
pub use speaker::{SpeakerTracker, SpeakerTurn};
pub use stt::{
    DeepgramLive, SpeechRecognizer, SttConnection, SttFrame, SttWord, VoiceActivity, decode_frame,
    dominant_speaker,
};
pub use tts::{AudioStream, SpeechSynthesizer, TextToSpeech};
pub use turn::{PacingConfig, TurnPhase, TurnTaker, debounce_interval, response_delay};
