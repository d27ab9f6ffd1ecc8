pub mod analysis;
pub mod capabilities;
pub mod context;
mod pipeline;

pub use analysis::{AgentAnalysis, Intent, analyze, classify_intent, extract_caller_name};
pub use capabilities::CapabilityCatalog;
pub use context::gather_memory;
pub use pipeline::{
    AgentPipeline, CHAT_MAX_TOKENS, FALLBACK_REPLY, ReplyMode, TurnReply, TurnRequest,
    VOICE_ATTEMPT_TIMEOUT, VOICE_MAX_TOKENS,
};
