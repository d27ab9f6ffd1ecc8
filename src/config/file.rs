//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` (or `$PARLEY_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{CapabilityEntry, ContactEntry};
use crate::steering::SteeringScript;
use crate::voice::PacingConfig;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub persona: PersonaFileConfig,

    #[serde(default)]
    pub owner: OwnerFileConfig,

    /// Static contact directory
    #[serde(default)]
    pub contacts: Vec<ContactEntry>,

    /// Capability table
    #[serde(default)]
    pub capabilities: Vec<CapabilityEntry>,

    /// Steering scripts and keyword lists (built-in defaults for anything omitted)
    #[serde(default)]
    pub steering: Option<SteeringScript>,

    /// Turn pacing
    #[serde(default)]
    pub pacing: Option<PacingConfig>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// `SQLite` database path
    pub database_path: Option<String>,
}

/// Voice pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Deepgram model (e.g. "nova-2-phonecall")
    pub stt_model: Option<String>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy" or an ElevenLabs voice id)
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Pause before the greeting, in milliseconds
    pub greeting_delay_ms: Option<u64>,

    /// Max time for one agent turn before the recovery line, in milliseconds
    pub response_timeout_ms: Option<u64>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Provider priority order ("anthropic", "openai", "openrouter")
    pub providers: Option<Vec<String>>,

    pub anthropic_model: Option<String>,
    pub openai_model: Option<String>,
    pub openrouter_model: Option<String>,

    /// Token budget for spoken replies
    pub voice_max_tokens: Option<u32>,

    /// Token budget for chat replies
    pub chat_max_tokens: Option<u32>,

    /// Per-provider deadline on voice turns, in milliseconds
    pub voice_attempt_timeout_ms: Option<u64>,
}

/// Assistant persona
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    pub assistant_name: Option<String>,
    pub business_name: Option<String>,
    pub portal_url: Option<String>,
    /// Extra style guidance appended to the system prompt
    pub style: Option<String>,
}

/// The owner the assistant answers for
#[derive(Debug, Default, Deserialize)]
pub struct OwnerFileConfig {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The default path is optional: a
/// missing or unreadable default file falls back to defaults with a warning.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<ParleyConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ParleyConfigFile::default());
    };

    if !path.exists() {
        return Ok(ParleyConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(ParleyConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(ParleyConfigFile::default())
        }
    }
}

/// Return the config file path: `$PARLEY_CONFIG` or `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
