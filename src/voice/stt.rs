//! Speech-to-text (STT) stream decoding
//!
//! Telephony audio is forwarded to a streaming recognizer; its JSON events are
//! decoded into [`SttFrame`]s. Frames that fail to parse are dropped here so
//! the call session never sees them.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::{Error, Result};

/// Buffered audio chunks between the media stream and the recognizer
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Buffered decoded frames between the recognizer and the call session
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Deepgram closes idle sockets after ~10s without audio or keep-alive
const KEEPALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(8);

/// How long a closing connection may take to flush before it is aborted
const CLOSE_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

const KEEPALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;
const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Voice-activity marker carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceActivity {
    /// The recognizer heard the start of speech
    SpeechStarted,
    /// The recognizer decided the current utterance is over
    UtteranceEnd,
}

/// A single recognized word with its diarized speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SttWord {
    pub text: String,
    pub speaker: Option<u32>,
}

impl SttWord {
    #[must_use]
    pub fn new(text: impl Into<String>, speaker: Option<u32>) -> Self {
        Self {
            text: text.into(),
            speaker,
        }
    }
}

/// One decoded recognition event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SttFrame {
    /// Final hypothesis (interim hypotheses are superseded later)
    pub is_final: bool,
    /// Hypothesis text
    pub text: String,
    /// Word-level detail, possibly carrying speaker tags
    pub words: Vec<SttWord>,
    /// Voice-activity marker, for event-only frames
    pub event: Option<VoiceActivity>,
}

impl SttFrame {
    /// Final hypothesis frame
    #[must_use]
    pub fn final_result(text: impl Into<String>, words: Vec<SttWord>) -> Self {
        Self {
            is_final: true,
            text: text.into(),
            words,
            event: None,
        }
    }

    /// Interim hypothesis frame
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            is_final: false,
            text: text.into(),
            words: Vec::new(),
            event: None,
        }
    }

    /// Event-only frame
    #[must_use]
    pub fn activity(event: VoiceActivity) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }

    /// True for a final hypothesis that carries text
    #[must_use]
    pub fn is_final_utterance(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }

    /// Number of words in the utterance, falling back to whitespace splitting
    /// when the recognizer sent no word detail
    #[must_use]
    pub fn word_count(&self) -> usize {
        if self.words.is_empty() {
            self.text.split_whitespace().count()
        } else {
            self.words.len()
        }
    }

    /// Dominant speaker of this frame's words
    #[must_use]
    pub fn dominant_speaker(&self) -> Option<u32> {
        dominant_speaker(&self.words)
    }
}

/// Pick the speaker who said the most words.
///
/// Ties go to the speaker encountered first in word order. Words without a
/// speaker tag do not vote; no tagged words at all yields `None`.
#[must_use]
pub fn dominant_speaker(words: &[SttWord]) -> Option<u32> {
    // (speaker, votes) in first-seen order
    let mut tally: Vec<(u32, usize)> = Vec::new();
    for speaker in words.iter().filter_map(|w| w.speaker) {
        match tally.iter_mut().find(|(s, _)| *s == speaker) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((speaker, 1)),
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for (speaker, votes) in tally {
        if best.is_none_or(|(_, top)| votes > top) {
            best = Some((speaker, votes));
        }
    }
    best.map(|(speaker, _)| speaker)
}

/// Streaming message from Deepgram live transcription
#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeepgramMessage {
    Results(DeepgramResults),
    SpeechStarted {},
    UtteranceEnd {},
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct DeepgramResults {
    #[serde(default)]
    is_final: bool,
    channel: DeepgramChannel,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    #[serde(default)]
    words: Vec<DeepgramWord>,
}

#[derive(Deserialize)]
struct DeepgramWord {
    word: String,
    #[serde(default)]
    punctuated_word: Option<String>,
    #[serde(default)]
    speaker: Option<u32>,
}

/// Decode one recognizer message.
///
/// Returns `None` for malformed JSON and for message types the call session
/// does not consume (metadata, warnings).
#[must_use]
pub fn decode_frame(raw: &str) -> Option<SttFrame> {
    let message: DeepgramMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::trace!(error = %e, "dropping malformed STT frame");
            return None;
        }
    };

    match message {
        DeepgramMessage::Results(results) => {
            let alternative = results.channel.alternatives.into_iter().next()?;
            let words = alternative
                .words
                .into_iter()
                .map(|w| SttWord {
                    text: w.punctuated_word.unwrap_or(w.word),
                    speaker: w.speaker,
                })
                .collect();
            Some(SttFrame {
                is_final: results.is_final,
                text: alternative.transcript,
                words,
                event: None,
            })
        }
        DeepgramMessage::SpeechStarted {} => Some(SttFrame::activity(VoiceActivity::SpeechStarted)),
        DeepgramMessage::UtteranceEnd {} => Some(SttFrame::activity(VoiceActivity::UtteranceEnd)),
        DeepgramMessage::Other => None,
    }
}

/// An open recognizer connection for one call
pub struct SttConnection {
    audio_tx: mpsc::Sender<Vec<u8>>,
    frames: Option<mpsc::Receiver<SttFrame>>,
    task: Option<JoinHandle<()>>,
}

impl SttConnection {
    /// Wrap the channel ends of a recognizer connection
    #[must_use]
    pub fn new(
        audio_tx: mpsc::Sender<Vec<u8>>,
        frames: mpsc::Receiver<SttFrame>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            audio_tx,
            frames: Some(frames),
            task,
        }
    }

    /// Take the decoded frame receiver (once)
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<SttFrame>> {
        self.frames.take()
    }

    /// Forward caller audio to the recognizer.
    ///
    /// Never blocks the media stream: a full buffer drops the chunk. Returns
    /// false once the connection is gone.
    pub fn send_audio(&self, chunk: Vec<u8>) -> bool {
        match self.audio_tx.try_send(chunk) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("STT audio buffer full, dropping chunk");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the connection, giving the recognizer a moment to flush
    pub fn close(self) {
        let Self { audio_tx, task, .. } = self;
        drop(audio_tx);
        if let Some(task) = task {
            let abort = task.abort_handle();
            tokio::spawn(async move {
                if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                    abort.abort();
                }
            });
        }
    }
}

/// Opens streaming recognition sessions
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Connect a new recognition stream for a call
    async fn connect(&self, call_id: &str) -> Result<SttConnection>;
}

/// Deepgram live transcription over a WebSocket
pub struct DeepgramLive {
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl DeepgramLive {
    /// Create a new Deepgram live recognizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            model,
            base_url: "wss://api.deepgram.com/v1/listen".to_string(),
        })
    }

    /// Listen URL for 8kHz μ-law telephony audio with diarization and VAD events
    fn listen_url(&self) -> String {
        format!(
            "{}?model={}&encoding=mulaw&sample_rate=8000&channels=1&interim_results=true\
             &utterance_end_ms=1000&vad_events=true&diarize=true&punctuate=true\
             &smart_format=true&endpointing=300",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

#[async_trait]
impl SpeechRecognizer for DeepgramLive {
    async fn connect(&self, call_id: &str) -> Result<SttConnection> {
        let mut request = self
            .listen_url()
            .into_client_request()
            .map_err(|e| Error::Stt(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key.expose_secret()))
            .map_err(|e| Error::Stt(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = tokio_tungstenite::connect_async(request).await.map_err(|e| {
            tracing::error!(call_id, error = %e, "Deepgram connection failed");
            Error::Stt(e.to_string())
        })?;
        tracing::info!(call_id, model = %self.model, "STT stream connected");

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_socket(socket, audio_rx, frame_tx, call_id.to_string()));

        Ok(SttConnection::new(audio_tx, frame_rx, Some(task)))
    }
}

/// Pump audio up and decoded frames down until either side goes away
async fn run_socket<S>(
    socket: S,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    frame_tx: mpsc::Sender<SttFrame>,
    call_id: String,
) where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await;
    let mut audio_open = true;

    loop {
        tokio::select! {
            chunk = audio_rx.recv(), if audio_open => {
                if let Some(chunk) = chunk {
                    if let Err(e) = sink.send(Message::Binary(chunk.into())).await {
                        tracing::warn!(call_id = %call_id, error = %e, "STT connection lost while sending audio");
                        break;
                    }
                } else {
                    audio_open = false;
                    let _ = sink.send(Message::Text(CLOSE_STREAM_MESSAGE.into())).await;
                }
            }
            _ = keepalive.tick(), if audio_open => {
                if let Err(e) = sink.send(Message::Text(KEEPALIVE_MESSAGE.into())).await {
                    tracing::warn!(call_id = %call_id, error = %e, "STT keep-alive failed");
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(frame) = decode_frame(text.as_str()) {
                        if frame_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(call_id = %call_id, "STT stream closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(call_id = %call_id, error = %e, "STT connection lost");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tags: &[(&str, Option<u32>)]) -> Vec<SttWord> {
        tags.iter().map(|(t, s)| SttWord::new(*t, *s)).collect()
    }

    #[test]
    fn majority_speaker_wins() {
        let mut w = Vec::new();
        for i in 0..7 {
            w.push(SttWord::new(format!("a{i}"), Some(2)));
        }
        for i in 0..3 {
            w.push(SttWord::new(format!("b{i}"), Some(5)));
        }
        assert_eq!(dominant_speaker(&w), Some(2));
    }

    #[test]
    fn tie_goes_to_first_speaker_in_word_order() {
        let w = words(&[("one", Some(4)), ("two", Some(1)), ("three", Some(1)), ("four", Some(4))]);
        assert_eq!(dominant_speaker(&w), Some(4));
    }

    #[test]
    fn untagged_words_yield_no_speaker() {
        let w = words(&[("hello", None), ("there", None)]);
        assert_eq!(dominant_speaker(&w), None);
        assert_eq!(dominant_speaker(&[]), None);
    }

    #[test]
    fn decodes_final_result_with_speakers() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "speech_final": true,
            "channel": {"alternatives": [{
                "transcript": "hi there",
                "confidence": 0.98,
                "words": [
                    {"word": "hi", "punctuated_word": "Hi", "speaker": 0, "start": 0.1},
                    {"word": "there", "speaker": 0}
                ]
            }]}
        }"#;
        let frame = decode_frame(raw).expect("results frame");
        assert!(frame.is_final_utterance());
        assert_eq!(frame.text, "hi there");
        assert_eq!(frame.words[0].text, "Hi");
        assert_eq!(frame.dominant_speaker(), Some(0));
        assert_eq!(frame.word_count(), 2);
    }

    #[test]
    fn decodes_activity_markers() {
        let started = decode_frame(r#"{"type":"SpeechStarted","channel":[0],"timestamp":1.2}"#);
        assert_eq!(started.and_then(|f| f.event), Some(VoiceActivity::SpeechStarted));

        let ended = decode_frame(r#"{"type":"UtteranceEnd","last_word_end":2.5}"#);
        assert_eq!(ended.and_then(|f| f.event), Some(VoiceActivity::UtteranceEnd));
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame(r#"{"type":"Results"}"#).is_none());
        assert!(decode_frame(r#"{"type":"Metadata","request_id":"x"}"#).is_none());
        assert!(decode_frame(r#"{"type":"Results","channel":{"alternatives":[]}}"#).is_none());
    }

    #[test]
    fn interim_frames_are_not_final_utterances() {
        let raw = r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"hel"}]}}"#;
        let frame = decode_frame(raw).expect("interim frame");
        assert!(!frame.is_final_utterance());
        assert!(!SttFrame::final_result("   ", Vec::new()).is_final_utterance());
    }

    #[test]
    fn deepgram_requires_key() {
        assert!(DeepgramLive::new(String::new(), "nova-2-phonecall".to_string()).is_err());
        let dg = DeepgramLive::new("key".to_string(), "nova-2-phonecall".to_string()).unwrap();
        let url = dg.listen_url();
        assert!(url.contains("encoding=mulaw"));
        assert!(url.contains("diarize=true"));
    }
}
