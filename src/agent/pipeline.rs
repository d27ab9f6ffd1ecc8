//! Agent pipeline: analysis → memory → capabilities → prompt → cascade

use std::sync::Arc;
use std::time::Duration;

use super::analysis::{Intent, analyze};
use super::capabilities::CapabilityCatalog;
use super::context::gather_memory;
use crate::call::CallerIdentity;
use crate::config::{OwnerConfig, PersonaConfig};
use crate::db::MemoryStore;
use crate::prompt::{PromptContext, build_system_prompt};
use crate::providers::{ChatTurn, CompletionCascade, CompletionRequest};
use crate::steering::Touchpoints;

/// Spoken when every provider fails
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having a bit of trouble on my end. Could you say that one more time?";

/// Short budget for spoken replies
pub const VOICE_MAX_TOKENS: u32 = 150;

/// Long budget for chat replies
pub const CHAT_MAX_TOKENS: u32 = 2048;

/// Per-provider deadline for spoken replies, so a stalled provider still
/// leaves time for the next one
pub const VOICE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(4);

/// Output channel of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Voice,
    Chat,
}

/// Input to one pipeline turn
pub struct TurnRequest<'a> {
    pub utterance: &'a str,
    /// Prior turns, oldest first, not including `utterance`
    pub history: &'a [ChatTurn],
    pub identity: &'a CallerIdentity,
    pub touchpoints: Option<&'a Touchpoints>,
    pub mode: ReplyMode,
}

/// Output of one pipeline turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub intent: Intent,
    /// Provider that answered; `None` for canned or fallback replies
    pub provider: Option<String>,
}

/// Runs one utterance through the agent stages
#[derive(Clone)]
pub struct AgentPipeline {
    cascade: CompletionCascade,
    memory: Arc<dyn MemoryStore>,
    capabilities: CapabilityCatalog,
    persona: PersonaConfig,
    owner: OwnerConfig,
    voice_max_tokens: u32,
    chat_max_tokens: u32,
    voice_attempt_timeout: Duration,
}

impl AgentPipeline {
    #[must_use]
    pub fn new(
        cascade: CompletionCascade,
        memory: Arc<dyn MemoryStore>,
        capabilities: CapabilityCatalog,
        persona: PersonaConfig,
        owner: OwnerConfig,
    ) -> Self {
        Self {
            cascade,
            memory,
            capabilities,
            persona,
            owner,
            voice_max_tokens: VOICE_MAX_TOKENS,
            chat_max_tokens: CHAT_MAX_TOKENS,
            voice_attempt_timeout: VOICE_ATTEMPT_TIMEOUT,
        }
    }

    /// Override the voice and chat token budgets
    #[must_use]
    pub const fn with_token_budgets(mut self, voice: u32, chat: u32) -> Self {
        self.voice_max_tokens = voice;
        self.chat_max_tokens = chat;
        self
    }

    /// Override the per-provider deadline used for spoken replies
    #[must_use]
    pub const fn with_voice_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.voice_attempt_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn cascade(&self) -> &CompletionCascade {
        &self.cascade
    }

    #[must_use]
    pub fn memory(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.memory)
    }

    /// Canned goodbye used when the caller wraps up
    #[must_use]
    pub fn farewell(&self, identity: &CallerIdentity) -> String {
        match identity.display_name.as_deref() {
            Some(name) if !identity.is_owner() => format!(
                "Thanks for calling, {name}! I'll pass everything along to {}. Take care!",
                self.owner.name
            ),
            Some(_) => "Talk soon. Bye!".to_string(),
            None => format!(
                "Thanks for calling {}! I'll pass everything along to {}. Take care!",
                self.persona.business_name, self.owner.name
            ),
        }
    }

    /// Produce a reply; never fails
    ///
    /// Store failures shrink the context. Provider failures fall through the
    /// cascade and end in [`FALLBACK_REPLY`].
    pub async fn respond(&self, request: TurnRequest<'_>) -> TurnReply {
        let analysis = analyze(request.utterance);
        tracing::debug!(
            intent = analysis.intent.as_str(),
            entities = analysis.entities.len(),
            "utterance analyzed"
        );

        if analysis.intent == Intent::Goodbye {
            return TurnReply {
                text: self.farewell(request.identity),
                intent: Intent::Goodbye,
                provider: None,
            };
        }

        let memory = gather_memory(self.memory.as_ref(), &analysis).await;
        let capabilities = if analysis.needs_capabilities {
            self.capabilities.relevant(&analysis.text)
        } else {
            Vec::new()
        };

        let system_prompt = build_system_prompt(&PromptContext {
            persona: &self.persona,
            owner: &self.owner,
            identity: request.identity,
            analysis: &analysis,
            memory: &memory,
            capabilities: &capabilities,
            touchpoints: request.touchpoints,
            mode: request.mode,
        });

        let mut history = request.history.to_vec();
        history.push(ChatTurn::user(request.utterance));

        let completion = CompletionRequest {
            system_prompt,
            history,
            max_tokens: match request.mode {
                ReplyMode::Voice => self.voice_max_tokens,
                ReplyMode::Chat => self.chat_max_tokens,
            },
            attempt_timeout: match request.mode {
                ReplyMode::Voice => Some(self.voice_attempt_timeout),
                ReplyMode::Chat => None,
            },
        };

        match self.cascade.complete(&completion).await {
            Some(reply) => TurnReply {
                text: reply.text,
                intent: analysis.intent,
                provider: Some(reply.provider),
            },
            None => TurnReply {
                text: FALLBACK_REPLY.to_string(),
                intent: analysis.intent,
                provider: None,
            },
        }
    }
}
