//! Agent pipeline integration tests

use std::sync::Arc;

use parley_gateway::Config;
use parley_gateway::agent::{AgentPipeline, CapabilityCatalog, FALLBACK_REPLY, Intent, ReplyMode, TurnRequest};
use parley_gateway::call::CallerIdentity;
use parley_gateway::config::CapabilityEntry;
use parley_gateway::db::{CATEGORY_CONTACT, MemoryRecord, MemoryStore};
use parley_gateway::providers::{ChatRole, ChatTurn};

mod common;
use common::{Script, ScriptedProvider, StubMemory, cascade};

fn pipeline(providers: &[Arc<ScriptedProvider>], memory: Arc<StubMemory>) -> AgentPipeline {
    let mut config = Config::default();
    config.capabilities = vec![CapabilityEntry {
        name: "Quotes".to_string(),
        description: "Rough project estimates".to_string(),
        keywords: vec!["quote".to_string(), "estimate".to_string()],
    }];
    AgentPipeline::new(
        cascade(providers),
        memory,
        CapabilityCatalog::new(config.capabilities.clone()),
        config.persona,
        config.owner,
    )
}

fn request<'a>(utterance: &'a str, identity: &'a CallerIdentity, mode: ReplyMode) -> TurnRequest<'a> {
    TurnRequest {
        utterance,
        history: &[],
        identity,
        touchpoints: None,
        mode,
    }
}

#[tokio::test]
async fn cascade_falls_through_in_priority_order() {
    let a = ScriptedProvider::new("a", Script::Fail);
    let b = ScriptedProvider::new("b", Script::Empty);
    let c = ScriptedProvider::replying("c", "From C.");
    let pipeline = pipeline(&[a.clone(), b.clone(), c.clone()], Arc::default());
    let caller = CallerIdentity::unknown(None);

    let reply = pipeline
        .respond(request("Can you send me a quote?", &caller, ReplyMode::Voice))
        .await;

    assert_eq!(reply.text, "From C.");
    assert_eq!(reply.provider.as_deref(), Some("c"));
    assert_eq!(reply.intent, Intent::Question);
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
}

#[tokio::test]
async fn first_success_short_circuits() {
    let a = ScriptedProvider::replying("a", "From A.");
    let b = ScriptedProvider::replying("b", "From B.");
    let pipeline = pipeline(&[a.clone(), b.clone()], Arc::default());
    let caller = CallerIdentity::unknown(None);

    let reply = pipeline
        .respond(request("We need a new logo", &caller, ReplyMode::Chat))
        .await;
    assert_eq!(reply.text, "From A.");
    assert_eq!(b.calls(), 0);
}

#[tokio::test]
async fn all_providers_failing_yields_fallback() {
    let a = ScriptedProvider::new("a", Script::Fail);
    let b = ScriptedProvider::new("b", Script::Fail);
    let pipeline = pipeline(&[a.clone(), b.clone()], Arc::default());
    let caller = CallerIdentity::unknown(None);

    let reply = pipeline
        .respond(request("What are your hours?", &caller, ReplyMode::Voice))
        .await;
    assert_eq!(reply.text, FALLBACK_REPLY);
    assert!(reply.provider.is_none());
    assert_eq!((a.calls(), b.calls()), (1, 1));
}

#[tokio::test]
async fn goodbye_never_calls_a_provider() {
    let a = ScriptedProvider::replying("a", "unused");
    let pipeline = pipeline(&[a.clone()], Arc::default());
    let caller = CallerIdentity::contact("Dana", Some("+15551234567".to_string()));

    let reply = pipeline
        .respond(request("Alright, talk to you later", &caller, ReplyMode::Voice))
        .await;
    assert_eq!(reply.intent, Intent::Goodbye);
    assert!(reply.text.contains("Dana"));
    assert!(reply.provider.is_none());
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn prompt_carries_memory_capabilities_and_budget() {
    let memory = Arc::new(StubMemory::default());
    memory
        .insert(MemoryRecord::new(CATEGORY_CONTACT, "Priya", "Prefers morning calls"))
        .await
        .unwrap();
    let a = ScriptedProvider::replying("a", "Sure thing.");
    let pipeline = pipeline(&[a.clone()], memory).with_token_budgets(90, 1000);
    let caller = CallerIdentity::unknown(None);

    pipeline
        .respond(request("Priya asked for an estimate", &caller, ReplyMode::Voice))
        .await;

    let sent = a.last_request().expect("provider called");
    assert_eq!(sent.max_tokens, 90);
    assert!(sent.system_prompt.contains("Prefers morning calls"));
    assert!(sent.system_prompt.contains("Quotes"));
    let last = sent.history.last().expect("caller turn");
    assert_eq!(last.role, ChatRole::User);
    assert_eq!(last.content, "Priya asked for an estimate");
}

#[tokio::test]
async fn history_is_sent_before_the_new_turn() {
    let a = ScriptedProvider::replying("a", "Noted.");
    let pipeline = pipeline(&[a.clone()], Arc::default());
    let caller = CallerIdentity::unknown(None);
    let history = vec![
        ChatTurn::assistant("Hi, thanks for calling!"),
        ChatTurn::user("Hi, it's about my order"),
        ChatTurn::assistant("Happy to help."),
    ];

    pipeline
        .respond(TurnRequest {
            utterance: "It shipped late",
            history: &history,
            identity: &caller,
            touchpoints: None,
            mode: ReplyMode::Chat,
        })
        .await;

    let sent = a.last_request().unwrap();
    assert_eq!(sent.max_tokens, 2048);
    assert_eq!(sent.history.len(), 4);
    assert_eq!(sent.history[3].content, "It shipped late");
}
