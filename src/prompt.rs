//! System prompt builder
//!
//! One prompt per turn, assembled from persona rules, caller identity, prior
//! history, retrieved memory, relevant capabilities, intent coaching and (on
//! calls) the outstanding steering checklist. Variable sections are
//! character-bounded so the prompt stays small on the voice path.

use std::fmt::Write as _;

use crate::agent::{AgentAnalysis, Intent, ReplyMode};
use crate::call::{CallerIdentity, CallerRole};
use crate::config::{CapabilityEntry, OwnerConfig, PersonaConfig};
use crate::db::MemoryRecord;
use crate::steering::{CallerCategory, Touchpoints};

/// Prior-call history excerpt budget
pub const MAX_HISTORY_CHARS: usize = 600;

/// Per-record budget for memory context
pub const MAX_MEMORY_RECORD_CHARS: usize = 240;

/// Everything the builder needs for one turn
pub struct PromptContext<'a> {
    pub persona: &'a PersonaConfig,
    pub owner: &'a OwnerConfig,
    pub identity: &'a CallerIdentity,
    pub analysis: &'a AgentAnalysis,
    pub memory: &'a [MemoryRecord],
    pub capabilities: &'a [&'a CapabilityEntry],
    /// Present only in guided (voice) mode
    pub touchpoints: Option<&'a Touchpoints>,
    pub mode: ReplyMode,
}

/// Truncate on a char boundary, appending an ellipsis when cut
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

fn persona_section(out: &mut String, ctx: &PromptContext<'_>) {
    let p = ctx.persona;
    let _ = writeln!(
        out,
        "You are {}, the assistant for {} ({}). You answer on behalf of {}.",
        p.assistant_name, p.business_name, p.portal_url, ctx.owner.name
    );
    if let Some(style) = p.style.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "Style: {}", style.trim());
    }
    out.push('\n');

    match ctx.mode {
        ReplyMode::Voice => out.push_str(
            "You are on a live phone call. Reply in one to three short spoken sentences. \
             No markdown, lists, emoji or URLs spelled with symbols. Never go silent; if \
             unsure, say so briefly and offer to take a message.\n",
        ),
        ReplyMode::Chat => out.push_str(
            "You are in a text chat. Be concise and helpful; light markdown is fine.\n",
        ),
    }
}

fn identity_section(out: &mut String, ctx: &PromptContext<'_>) {
    let identity = ctx.identity;
    out.push_str("\n## Caller\n");
    match identity.role {
        CallerRole::Owner => {
            let _ = writeln!(
                out,
                "This is {}, the owner. Full access: share anything they ask about, \
                 including schedule and private details.",
                ctx.owner.name
            );
        }
        CallerRole::Contact => {
            let _ = writeln!(
                out,
                "This is {}, a known contact. Be warm and helpful. Share general \
                 availability but not private details.",
                identity.name_or_there()
            );
        }
        CallerRole::Unknown => {
            out.push_str(
                "This caller is not in the contact list. Be friendly, but never share the \
                 owner's schedule, whereabouts, financial information or personal details. \
                 Offer to take a message instead.\n",
            );
        }
    }
    if let Some(notes) = identity.prompt_notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(out, "Notes: {}", notes.trim());
    }

    let name = ctx
        .touchpoints
        .and_then(|tp| tp.caller_name.as_deref())
        .or(identity.display_name.as_deref());
    if let Some(name) = name {
        let _ = writeln!(out, "Caller name: {name}. Use it occasionally, not every sentence.");
    }

    if let Some(history) = identity.history() {
        let _ = writeln!(
            out,
            "Previous conversation: {}",
            truncate_chars(history, MAX_HISTORY_CHARS)
        );
    }
}

fn memory_section(out: &mut String, records: &[MemoryRecord]) {
    if records.is_empty() {
        return;
    }
    out.push_str("\n## Relevant notes\n");
    for record in records {
        let _ = writeln!(
            out,
            "- [{}] {}: {}",
            record.category,
            record.subject,
            truncate_chars(&record.content, MAX_MEMORY_RECORD_CHARS)
        );
    }
}

fn capability_section(out: &mut String, capabilities: &[&CapabilityEntry]) {
    if capabilities.is_empty() {
        return;
    }
    out.push_str("\n## What you can help with\n");
    for cap in capabilities {
        let _ = writeln!(out, "- {}: {}", cap.name, cap.description);
    }
}

fn coaching_section(out: &mut String, intent: Intent) {
    let line = match intent {
        Intent::Greeting => "The caller is greeting you. Greet back briefly and ask how you can help.",
        Intent::Question => "The caller asked a question. Answer it directly first.",
        Intent::Command => "The caller wants something done. Confirm what you will do or take it as a message.",
        Intent::General => "Acknowledge what the caller said and keep the conversation moving.",
        Intent::Goodbye => "The caller is wrapping up. Say a warm goodbye.",
    };
    out.push_str("\n## This turn\n");
    out.push_str(line);
    out.push('\n');
}

fn steering_section(out: &mut String, touchpoints: &Touchpoints) {
    if touchpoints.category() == CallerCategory::Owner {
        return;
    }
    let outstanding = touchpoints.outstanding();
    if outstanding.is_empty() {
        return;
    }
    let items: Vec<&str> = outstanding.iter().map(|t| t.as_str()).collect();
    let _ = writeln!(
        out,
        "\n## Call guide ({} caller, turn {})\nStill to cover when it fits naturally: {}. \
         Do not force more than one per reply.",
        touchpoints.category().as_str(),
        touchpoints.turn,
        items.join(", ")
    );
}

/// Build the system prompt for one turn
#[must_use]
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::with_capacity(2048);

    persona_section(&mut out, ctx);
    identity_section(&mut out, ctx);
    memory_section(&mut out, ctx.memory);
    capability_section(&mut out, ctx.capabilities);
    coaching_section(&mut out, ctx.analysis.intent);
    if ctx.mode == ReplyMode::Voice
        && let Some(touchpoints) = ctx.touchpoints
    {
        steering_section(&mut out, touchpoints);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::analyze;
    use crate::steering::TouchpointState;

    fn persona() -> PersonaConfig {
        PersonaConfig {
            assistant_name: "Ava".to_string(),
            business_name: "Harbor Studio".to_string(),
            portal_url: "https://harbor.example".to_string(),
            style: Some("Upbeat".to_string()),
        }
    }

    fn owner() -> OwnerConfig {
        OwnerConfig {
            name: "Jordan".to_string(),
            phone: None,
            email: None,
        }
    }

    #[test]
    fn unknown_caller_is_guarded() {
        let persona = persona();
        let owner = owner();
        let identity = CallerIdentity::unknown(Some("+15551234567".into()));
        let analysis = analyze("Where is Jordan today?");
        let prompt = build_system_prompt(&PromptContext {
            persona: &persona,
            owner: &owner,
            identity: &identity,
            analysis: &analysis,
            memory: &[],
            capabilities: &[],
            touchpoints: None,
            mode: ReplyMode::Voice,
        });
        assert!(prompt.contains("never share the owner's schedule"));
        assert!(prompt.contains("Harbor Studio"));
        assert!(prompt.contains("Style: Upbeat"));
        assert!(prompt.contains("Answer it directly"));
    }

    #[test]
    fn owner_is_unrestricted_and_unguided() {
        let persona = persona();
        let owner = owner();
        let identity = CallerIdentity::owner("Jordan", None);
        let analysis = analyze("what's on today");
        let touchpoints = Touchpoints::new(TouchpointState::for_category(CallerCategory::Owner));
        let prompt = build_system_prompt(&PromptContext {
            persona: &persona,
            owner: &owner,
            identity: &identity,
            analysis: &analysis,
            memory: &[],
            capabilities: &[],
            touchpoints: Some(&touchpoints),
            mode: ReplyMode::Voice,
        });
        assert!(prompt.contains("Full access"));
        assert!(!prompt.contains("Call guide"));
    }

    #[test]
    fn guided_mode_lists_outstanding_touchpoints() {
        let persona = persona();
        let owner = owner();
        let identity = CallerIdentity::unknown(None);
        let analysis = analyze("I need a quote");
        let touchpoints = Touchpoints::new(TouchpointState::for_category(CallerCategory::FirstTime));
        let cap = CapabilityEntry {
            name: "quotes".to_string(),
            description: "Rough project estimates".to_string(),
            keywords: vec!["quote".to_string()],
        };
        let record = MemoryRecord::new("pricing", "Rates", "Kitchens start at 20k");
        let prompt = build_system_prompt(&PromptContext {
            persona: &persona,
            owner: &owner,
            identity: &identity,
            analysis: &analysis,
            memory: std::slice::from_ref(&record),
            capabilities: &[&cap],
            touchpoints: Some(&touchpoints),
            mode: ReplyMode::Voice,
        });
        assert!(prompt.contains("PORTAL"));
        assert!(prompt.contains("Kitchens start at 20k"));
        assert!(prompt.contains("Rough project estimates"));
    }

    #[test]
    fn history_is_truncated() {
        let long = "x".repeat(MAX_HISTORY_CHARS + 50);
        let cut = truncate_chars(&long, MAX_HISTORY_CHARS);
        assert_eq!(cut.chars().count(), MAX_HISTORY_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
