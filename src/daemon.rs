//! Daemon - the main gateway service
//!
//! Wires configuration into the completion cascade, the agent pipeline, the
//! voice adapters and outbound channels, then serves the HTTP API until
//! interrupted.

use std::sync::Arc;

use crate::agent::{AgentPipeline, CapabilityCatalog};
use crate::api::{ApiServer, ApiState};
use crate::call::CallServices;
use crate::channels::{OutboundChannels, ResendEmail, TwilioSms};
use crate::db::{self, CallRepo, DbPool, MemoryRepo, SessionRepo};
use crate::providers::{AnthropicProvider, CompletionCascade, CompletionProvider, OpenAiCompatProvider};
use crate::voice::{DeepgramLive, SpeechRecognizer, SpeechSynthesizer, TextToSpeech};
use crate::{Config, Error, Result};

/// The Parley daemon - serves calls and chat
pub struct Daemon {
    config: Config,
    db: DbPool,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        let db = db::init(&config.server.database_path)?;
        tracing::info!(path = %config.server.database_path.display(), "database initialized");
        Ok(Self { config, db })
    }

    /// Daemon over an existing pool
    #[must_use]
    pub const fn with_pool(config: Config, db: DbPool) -> Self {
        Self { config, db }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn pool(&self) -> &DbPool {
        &self.db
    }

    /// Agent pipeline over every provider with a key
    #[must_use]
    pub fn pipeline(&self) -> AgentPipeline {
        AgentPipeline::new(
            build_cascade(&self.config),
            Arc::new(MemoryRepo::new(self.db.clone())),
            CapabilityCatalog::new(self.config.capabilities.clone()),
            self.config.persona.clone(),
            self.config.owner.clone(),
        )
        .with_token_budgets(self.config.llm.voice_max_tokens, self.config.llm.chat_max_tokens)
        .with_voice_attempt_timeout(self.config.llm.voice_attempt_timeout)
    }

    /// Everything live calls need
    ///
    /// # Errors
    ///
    /// Returns error if no speech synthesizer can be configured
    pub fn call_services(&self) -> Result<CallServices> {
        let synthesizer = build_synthesizer(&self.config)?;
        let recognizer = build_recognizer(&self.config);
        if recognizer.is_none() {
            tracing::warn!("DEEPGRAM_API_KEY not set, calls will run without transcription");
        }

        Ok(CallServices::new(
            &self.config,
            self.pipeline(),
            Arc::new(CallRepo::new(self.db.clone())),
            Arc::new(build_channels(&self.config)),
            synthesizer,
            recognizer,
        ))
    }

    /// Serve until Ctrl-C, then hang up any live calls
    ///
    /// # Errors
    ///
    /// Returns error if services cannot be configured or the server fails
    pub async fn run(self) -> Result<()> {
        let calls = Arc::new(self.call_services()?);
        if calls.pipeline.cascade().is_empty() {
            tracing::warn!("no completion providers configured, every turn will use the fallback reply");
        }

        let state = Arc::new(ApiState {
            calls: Arc::clone(&calls),
            sessions: SessionRepo::new(self.db.clone()),
        });

        tracing::info!(
            port = self.config.server.port,
            providers = ?calls.pipeline.cascade().names(),
            contacts = calls.directory.len(),
            "parley gateway ready"
        );

        ApiServer::new(state, self.config.server.port)
            .run(shutdown_signal())
            .await?;

        for stream_id in calls.registry.stream_ids().await {
            if let Some(call) = calls.registry.get(&stream_id).await {
                call.stop().await;
            }
        }

        tracing::info!("parley gateway stopped");
        Ok(())
    }
}

/// Providers in configured order, skipping any without a key
#[must_use]
pub fn build_cascade(config: &Config) -> CompletionCascade {
    let keys = &config.api_keys;
    let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();

    for name in &config.llm.providers {
        let built = match name.as_str() {
            "anthropic" => keys.anthropic.clone().map(|key| {
                AnthropicProvider::new(key, config.llm.anthropic_model.clone())
                    .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>)
            }),
            "openai" => keys.openai.clone().map(|key| {
                OpenAiCompatProvider::openai(key, config.llm.openai_model.clone())
                    .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>)
            }),
            "openrouter" => keys.openrouter.clone().map(|key| {
                OpenAiCompatProvider::openrouter(key, config.llm.openrouter_model.clone())
                    .map(|p| Arc::new(p) as Arc<dyn CompletionProvider>)
            }),
            other => {
                tracing::warn!(provider = other, "unknown completion provider, skipping");
                continue;
            }
        };

        match built {
            Some(Ok(provider)) => {
                tracing::debug!(provider = %name, "completion provider enabled");
                providers.push(provider);
            }
            Some(Err(e)) => tracing::warn!(provider = %name, error = %e, "completion provider disabled"),
            None => tracing::warn!(provider = %name, "no API key, skipping completion provider"),
        }
    }

    CompletionCascade::new(providers)
}

fn build_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    let voice = &config.voice;
    let tts = match voice.tts_provider.as_str() {
        "elevenlabs" => TextToSpeech::new_elevenlabs(
            config.api_keys.elevenlabs.clone().unwrap_or_default(),
            voice.tts_voice.clone(),
            voice.tts_model.clone(),
        )?,
        "openai" => TextToSpeech::new_openai(
            config.api_keys.openai.clone().unwrap_or_default(),
            voice.tts_voice.clone(),
            voice.tts_speed,
            voice.tts_model.clone(),
        )?,
        other => {
            return Err(Error::Config(format!("unknown TTS provider: {other}")));
        }
    };
    Ok(Arc::new(tts))
}

fn build_recognizer(config: &Config) -> Option<Arc<dyn SpeechRecognizer>> {
    let key = config.api_keys.deepgram.clone()?;
    match DeepgramLive::new(key, config.voice.stt_model.clone()) {
        Ok(stt) => Some(Arc::new(stt)),
        Err(e) => {
            tracing::warn!(error = %e, "speech recognition disabled");
            None
        }
    }
}

/// Twilio and Resend adapters for whichever have credentials
#[must_use]
pub fn build_channels(config: &Config) -> OutboundChannels {
    let keys = &config.api_keys;

    let sms = match (
        keys.twilio_account_sid.clone(),
        keys.twilio_auth_token.clone(),
        keys.twilio_from_number.clone(),
    ) {
        (Some(sid), Some(token), Some(from)) => TwilioSms::new(sid, token, from)
            .inspect_err(|e| tracing::warn!(error = %e, "SMS disabled"))
            .ok(),
        _ => None,
    };

    let email = match (keys.resend.clone(), keys.resend_from.clone()) {
        (Some(key), Some(from)) => ResendEmail::new(key, from)
            .inspect_err(|e| tracing::warn!(error = %e, "email disabled"))
            .ok(),
        _ => None,
    };

    tracing::debug!(sms = sms.is_some(), email = email.is_some(), "outbound channels configured");
    OutboundChannels::new(sms, email)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
