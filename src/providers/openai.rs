//! OpenAI-compatible chat completions provider (OpenAI, OpenRouter)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{CompletionProvider, CompletionRequest, REQUEST_TIMEOUT};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Any chat-completions endpoint speaking the OpenAI wire format
pub struct OpenAiCompatProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: SecretString,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a provider for an arbitrary compatible endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be built
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: String,
        model: String,
    ) -> Result<Self> {
        let name = name.into();
        if api_key.is_empty() {
            return Err(Error::Config(format!("{name} API key required")));
        }

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            name,
            base_url: base_url.into(),
            api_key: SecretString::from(api_key),
            model,
        })
    }

    /// `OpenAI` chat completions
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn openai(api_key: String, model: String) -> Result<Self> {
        Self::new("openai", OPENAI_BASE_URL, api_key, model)
    }

    /// `OpenRouter` chat completions
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn openrouter(api_key: String, model: String) -> Result<Self> {
        Self::new("openrouter", OPENROUTER_BASE_URL, api_key, model)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let history = request.normalized_history();
        if history.is_empty() {
            return Err(Error::provider(self.name(), "empty conversation"));
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        messages.extend(history.iter().map(|t| ChatMessage {
            role: match t.role {
                super::ChatRole::User => "user",
                super::ChatRole::Assistant => "assistant",
            },
            content: &t.content,
        }));

        let body = ChatRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(self.name(), format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(self.name(), format!("malformed response: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_constructors() {
        let openai = OpenAiCompatProvider::openai("k".into(), "gpt-4o-mini".into()).unwrap();
        assert_eq!(openai.name(), "openai");
        let router = OpenAiCompatProvider::openrouter("k".into(), "m".into()).unwrap();
        assert_eq!(router.name(), "openrouter");
        assert!(OpenAiCompatProvider::openai(String::new(), "m".into()).is_err());
    }

    #[test]
    fn missing_content_is_empty() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
