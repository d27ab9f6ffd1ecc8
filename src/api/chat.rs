//! Text chat endpoint
//!
//! Runs the agent pipeline in chat mode (long budget, no steering) with
//! per-session history in `SQLite`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::agent::{ReplyMode, TurnRequest};
use crate::call::resolve_identity;
use crate::db::{self, ChatMessage, MessageRole};
use crate::providers::ChatTurn;

/// Messages of history sent with each turn
pub const HISTORY_LIMIT: usize = 20;

/// Longest accepted message
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Resolves caller identity like an inbound call would
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub intent: String,
    pub provider: Option<String>,
}

/// Chat API errors
#[derive(Debug)]
pub enum ChatError {
    BadRequest(&'static str),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.to_string()),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}

fn to_turn(message: ChatMessage) -> ChatTurn {
    match message.role {
        MessageRole::User => ChatTurn::user(message.content),
        MessageRole::Assistant => ChatTurn::assistant(message.content),
    }
}

/// Handle one chat message
///
/// Storage failures degrade to a history-less, unpersisted turn.
async fn chat(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ChatError::BadRequest("message is required"));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ChatError::BadRequest("message is too long"));
    }

    let repo = state.sessions.clone();
    let requested_id = request.session_id.clone();
    let phone = request.phone.clone();
    let session = db::blocking(move || {
        repo.find_or_create(requested_id.as_deref(), phone.as_deref())
    })
    .await;

    let (session_id, persisted) = match session {
        Ok(session) => (session.id, true),
        Err(e) => {
            tracing::warn!(error = %e, "chat session unavailable, continuing without history");
            (
                request
                    .session_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                false,
            )
        }
    };

    let history: Vec<ChatTurn> = if persisted {
        let repo = state.sessions.clone();
        let id = session_id.clone();
        match db::blocking(move || repo.get_messages(&id, HISTORY_LIMIT)).await {
            Ok(messages) => messages.into_iter().map(to_turn).collect(),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "failed to load chat history");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let services = &state.calls;
    let memory = services.pipeline.memory();
    let identity = resolve_identity(&services.directory, memory.as_ref(), request.phone.as_deref()).await;

    let reply = services
        .pipeline
        .respond(TurnRequest {
            utterance: &message,
            history: &history,
            identity: &identity,
            touchpoints: None,
            mode: ReplyMode::Chat,
        })
        .await;

    if persisted {
        let repo = state.sessions.clone();
        let id = session_id.clone();
        let user_text = message.clone();
        let reply_text = reply.text.clone();
        let saved = db::blocking(move || {
            repo.add_message(&id, MessageRole::User, &user_text)?;
            repo.add_message(&id, MessageRole::Assistant, &reply_text)?;
            Ok(())
        })
        .await;
        if let Err(e) = saved {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist chat turn");
        }
    }

    tracing::debug!(
        session_id = %session_id,
        intent = reply.intent.as_str(),
        provider = reply.provider.as_deref().unwrap_or("none"),
        "chat turn complete"
    );

    Ok(Json(ChatResponse {
        session_id,
        reply: reply.text,
        intent: reply.intent.as_str().to_string(),
        provider: reply.provider,
    }))
}

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(state)
}
