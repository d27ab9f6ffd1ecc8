//! Text-to-speech (TTS) processing
//!
//! Both backends stream telephony-ready audio (8kHz μ-law). ElevenLabs can
//! produce it directly; OpenAI returns 24kHz PCM which is transcoded on the fly.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};

use super::codec::PcmTranscoder;
use crate::{Error, Result};

/// Stream of 8kHz μ-law audio chunks
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Turns reply text into telephony audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing; audio arrives as a stream of μ-law chunks
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f32, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key),
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key),
            voice: voice_id,
            speed: 1.0, // ElevenLabs doesn't use speed in the same way
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Provider name for logs and health output
    #[must_use]
    pub const fn provider_name(&self) -> &'static str {
        match self.provider {
            TtsProvider::OpenAI => "openai",
            TtsProvider::ElevenLabs => "elevenlabs",
        }
    }

    /// Synthesize using OpenAI TTS (raw 24kHz PCM, transcoded)
    async fn synthesize_openai(&self, text: &str) -> Result<AudioStream> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "pcm",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        // Transcoder is dropped after the tail is flushed or on the first error
        let transcoder = PcmTranscoder::new()?;
        let body = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (body, Some(transcoder)),
            |(mut body, mut transcoder)| async move {
                let active = transcoder.as_mut()?;
                let item = match body.next().await {
                    Some(Ok(bytes)) => active.push(&bytes),
                    Some(Err(e)) => {
                        let err = Error::Tts(e.to_string());
                        return Some((Err(err), (body, None)));
                    }
                    None => {
                        let tail = active.finish();
                        return Some((tail, (body, None)));
                    }
                };
                Some((item, (body, transcoder)))
            },
        );
        Ok(Box::pin(stream))
    }

    /// Synthesize using ElevenLabs TTS (μ-law 8kHz straight from the API)
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<AudioStream> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}/stream?output_format=ulaw_8000",
            self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| Error::Tts(e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        tracing::debug!(provider = self.provider_name(), chars = text.len(), "synthesizing");
        match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }
}
