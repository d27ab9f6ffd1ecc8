//! Configuration management for the Parley gateway

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::steering::SteeringScript;
use crate::voice::PacingConfig;
use crate::Result;

use file::ParleyConfigFile;

/// Default provider priority
const DEFAULT_PROVIDERS: [&str; 3] = ["anthropic", "openai", "openrouter"];

/// Parley gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub voice: VoiceConfig,
    pub llm: LlmConfig,
    pub persona: PersonaConfig,
    pub owner: OwnerConfig,

    /// Static contact directory
    pub contacts: Vec<ContactEntry>,

    /// Capability table advertised to the agent
    pub capabilities: Vec<CapabilityEntry>,

    /// Steering scripts and keyword lists
    pub steering: SteeringScript,

    /// Turn pacing
    pub pacing: PacingConfig,

    /// API keys and credentials
    pub api_keys: ApiKeys,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// `SQLite` database path
    pub database_path: PathBuf,
}

/// Voice pipeline configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Deepgram live model
    pub stt_model: String,

    /// "openai" or "elevenlabs"
    pub tts_provider: String,

    /// TTS model
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (OpenAI only)
    pub tts_speed: f32,

    /// Pause between stream start and the greeting
    pub greeting_delay: Duration,

    /// Max time for one agent turn before the recovery line is spoken
    pub response_timeout: Duration,
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider priority order
    pub providers: Vec<String>,
    pub anthropic_model: String,
    pub openai_model: String,
    pub openrouter_model: String,

    /// Token budget for spoken replies
    pub voice_max_tokens: u32,

    /// Token budget for chat replies
    pub chat_max_tokens: u32,

    /// Per-provider deadline on voice turns before the cascade moves on
    pub voice_attempt_timeout: Duration,
}

/// Assistant persona
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    pub assistant_name: String,
    pub business_name: String,
    pub portal_url: String,
    pub style: Option<String>,
}

/// The owner the assistant answers for
#[derive(Debug, Clone)]
pub struct OwnerConfig {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A contact directory entry
#[derive(Debug, Clone, Deserialize)]
pub struct ContactEntry {
    pub name: String,
    pub phone: String,

    /// Custom greeting template (`{name}`, `{assistant}`, `{owner}`)
    #[serde(default)]
    pub greeting: Option<String>,

    /// Notes injected into the prompt for this caller
    #[serde(default)]
    pub notes: Option<String>,
}

/// A capability the agent can offer
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub openrouter: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
    pub resend: Option<String>,
    pub resend_from: Option<String>,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given config file cannot be loaded
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Ok(Self::resolve(fc, |key| {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }))
    }

    /// Merge a file overlay with an environment lookup
    pub fn resolve(fc: ParleyConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let api_keys = ApiKeys {
            anthropic: env("ANTHROPIC_API_KEY"),
            openai: env("OPENAI_API_KEY"),
            openrouter: env("OPENROUTER_API_KEY"),
            deepgram: env("DEEPGRAM_API_KEY"),
            elevenlabs: env("ELEVENLABS_API_KEY"),
            twilio_account_sid: env("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: env("TWILIO_AUTH_TOKEN"),
            twilio_from_number: env("TWILIO_FROM_NUMBER"),
            resend: env("RESEND_API_KEY"),
            resend_from: env("RESEND_FROM"),
        };

        // Data directory (~/.local/share/parley on Linux)
        let data_dir = directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("parley"));

        let server = ServerConfig {
            port: env("PARLEY_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(18800),
            database_path: env("PARLEY_DB_PATH")
                .or(fc.server.database_path)
                .map_or_else(|| data_dir.join("parley.db"), PathBuf::from),
        };

        let voice = VoiceConfig {
            stt_model: env("PARLEY_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "nova-2-phonecall".to_string()),
            tts_provider: env("PARLEY_TTS_PROVIDER")
                .or(fc.voice.tts_provider)
                .unwrap_or_else(|| "openai".to_string()),
            tts_model: env("PARLEY_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: env("PARLEY_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            greeting_delay: Duration::from_millis(fc.voice.greeting_delay_ms.unwrap_or(500)),
            response_timeout: Duration::from_millis(
                fc.voice.response_timeout_ms.unwrap_or(12_000),
            ),
        };

        let llm = LlmConfig {
            providers: env("PARLEY_LLM_PROVIDERS")
                .map(|s| {
                    s.split(',')
                        .map(|p| p.trim().to_lowercase())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .or(fc.llm.providers)
                .unwrap_or_else(|| DEFAULT_PROVIDERS.iter().map(ToString::to_string).collect()),
            anthropic_model: fc
                .llm
                .anthropic_model
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            openai_model: fc.llm.openai_model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openrouter_model: fc
                .llm
                .openrouter_model
                .unwrap_or_else(|| "meta-llama/llama-3.3-70b-instruct".to_string()),
            voice_max_tokens: fc.llm.voice_max_tokens.unwrap_or(150),
            chat_max_tokens: fc.llm.chat_max_tokens.unwrap_or(2048),
            voice_attempt_timeout: Duration::from_millis(
                fc.llm.voice_attempt_timeout_ms.unwrap_or(4_000),
            ),
        };

        let persona = PersonaConfig {
            assistant_name: fc.persona.assistant_name.unwrap_or_else(|| "Ava".to_string()),
            business_name: fc
                .persona
                .business_name
                .unwrap_or_else(|| "the studio".to_string()),
            portal_url: fc
                .persona
                .portal_url
                .unwrap_or_else(|| "https://example.com".to_string()),
            style: fc.persona.style,
        };

        let owner = OwnerConfig {
            name: env("PARLEY_OWNER_NAME")
                .or(fc.owner.name)
                .unwrap_or_else(|| "the owner".to_string()),
            phone: env("PARLEY_OWNER_PHONE").or(fc.owner.phone),
            email: env("PARLEY_OWNER_EMAIL").or(fc.owner.email),
        };

        Self {
            server,
            voice,
            llm,
            persona,
            owner,
            contacts: fc.contacts,
            capabilities: fc.capabilities,
            steering: fc.steering.unwrap_or_default(),
            pacing: fc.pacing.unwrap_or_default(),
            api_keys,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(ParleyConfigFile::default(), |_| None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::default();
        assert_eq!(config.server.port, 18800);
        assert_eq!(config.llm.providers, vec!["anthropic", "openai", "openrouter"]);
        assert_eq!(config.llm.voice_max_tokens, 150);
        assert_eq!(config.llm.chat_max_tokens, 2048);
        assert_eq!(config.llm.voice_attempt_timeout, Duration::from_secs(4));
        assert_eq!(config.voice.response_timeout, Duration::from_secs(12));
        assert!(config.api_keys.anthropic.is_none());
    }

    #[test]
    fn env_beats_file() {
        let fc: ParleyConfigFile = toml::from_str(
            "[server]\nport = 9000\n[llm]\nproviders = [\"openai\"]\n[owner]\nphone = \"+15550001111\"\n",
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("PARLEY_PORT", "7000"),
            ("PARLEY_LLM_PROVIDERS", "openrouter, Anthropic"),
            ("DEEPGRAM_API_KEY", "dg"),
        ]
        .into_iter()
        .collect();

        let config = Config::resolve(fc, |k| env.get(k).map(ToString::to_string));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.llm.providers, vec!["openrouter", "anthropic"]);
        assert_eq!(config.owner.phone.as_deref(), Some("+15550001111"));
        assert_eq!(config.api_keys.deepgram.as_deref(), Some("dg"));
    }
}
