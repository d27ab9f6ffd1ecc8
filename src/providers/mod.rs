//! LLM completion providers and the fallback cascade
//!
//! Providers are interchangeable strategies behind [`CompletionProvider`].
//! [`CompletionCascade`] tries them in priority order and returns the first
//! non-empty reply.

mod anthropic;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatProvider;

/// Per-request HTTP timeout for completion calls
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversation role of a history turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of conversation history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Conversation so far, ending with the caller's turn
    pub history: Vec<ChatTurn>,
    pub max_tokens: u32,
    /// Deadline for each provider attempt; on expiry the cascade moves on
    pub attempt_timeout: Option<Duration>,
}

impl CompletionRequest {
    /// History with empty turns dropped, consecutive same-role turns merged
    /// and leading assistant turns removed, as strict chat APIs require
    #[must_use]
    pub fn normalized_history(&self) -> Vec<ChatTurn> {
        let mut out: Vec<ChatTurn> = Vec::with_capacity(self.history.len());
        for turn in &self.history {
            let content = turn.content.trim();
            if content.is_empty() || (out.is_empty() && turn.role == ChatRole::Assistant) {
                continue;
            }
            match out.last_mut() {
                Some(last) if last.role == turn.role => {
                    last.content.push('\n');
                    last.content.push_str(content);
                }
                _ => out.push(ChatTurn {
                    role: turn.role,
                    content: content.to_string(),
                }),
            }
        }
        out
    }
}

/// A completion backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Stable provider name for logs
    fn name(&self) -> &str;

    /// Produce reply text
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Reply produced by the cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReply {
    pub text: String,
    pub provider: String,
}

/// Ordered provider fallback
#[derive(Clone, Default)]
pub struct CompletionCascade {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl CompletionCascade {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in priority order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Try each provider in order; first non-empty text wins
    ///
    /// Failures, timeouts and empty replies are logged and the next provider
    /// is tried.
    /// Returns `None` only when every provider failed.
    pub async fn complete(&self, request: &CompletionRequest) -> Option<CascadeReply> {
        for provider in &self.providers {
            let attempt = match request.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, provider.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            provider = provider.name(),
                            timeout_ms = limit.as_millis(),
                            "provider timed out, trying next"
                        );
                        continue;
                    }
                },
                None => provider.complete(request).await,
            };

            match attempt {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(provider = provider.name(), chars = text.len(), "completion succeeded");
                    return Some(CascadeReply {
                        text: text.trim().to_string(),
                        provider: provider.name().to_string(),
                    });
                }
                Ok(_) => {
                    tracing::warn!(provider = provider.name(), "provider returned empty text, trying next");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider failed, trying next");
                }
            }
        }

        tracing::error!(providers = self.providers.len(), "all completion providers failed");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_normalized_for_strict_apis() {
        let request = CompletionRequest {
            system_prompt: String::new(),
            history: vec![
                ChatTurn::assistant("Hi, thanks for calling!"),
                ChatTurn::user("hello"),
                ChatTurn::user("are you there"),
                ChatTurn::assistant("   "),
                ChatTurn::assistant("Yes!"),
                ChatTurn::user("great"),
            ],
            max_tokens: 10,
            attempt_timeout: None,
        };
        let normalized = request.normalized_history();
        assert_eq!(
            normalized,
            vec![
                ChatTurn::user("hello\nare you there"),
                ChatTurn::assistant("Yes!"),
                ChatTurn::user("great"),
            ]
        );
    }

    struct Stalled;

    #[async_trait]
    impl CompletionProvider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    struct Answers;

    #[async_trait]
    impl CompletionProvider for Answers {
        fn name(&self) -> &str {
            "answers"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok("  On it. ".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out_to_the_next() {
        let cascade = CompletionCascade::new(vec![Arc::new(Stalled), Arc::new(Answers)]);
        let request = CompletionRequest {
            system_prompt: String::new(),
            history: vec![ChatTurn::user("hi")],
            max_tokens: 10,
            attempt_timeout: Some(Duration::from_secs(4)),
        };

        let started = tokio::time::Instant::now();
        let reply = cascade.complete(&request).await.expect("second provider answers");
        assert_eq!(reply.provider, "answers");
        assert_eq!(reply.text, "On it.");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn empty_cascade_yields_none() {
        let cascade = CompletionCascade::default();
        let request = CompletionRequest {
            system_prompt: String::new(),
            history: vec![ChatTurn::user("hi")],
            max_tokens: 10,
            attempt_timeout: None,
        };
        assert!(cascade.complete(&request).await.is_none());
    }
}
