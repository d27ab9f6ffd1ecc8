//! Telephony media stream WebSocket
//!
//! Speaks the carrier's bidirectional stream protocol: JSON events in
//! (`connected`, `start`, `media`, `mark`, `stop`), `media` and `clear` out.
//! Audio both ways is base64 8kHz μ-law.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use crate::call::{ActiveCall, StreamStart};
use crate::voice::MediaSink;
use crate::{Error, Result};

/// Outbound message buffer per stream
const OUTBOUND_BUFFER: usize = 256;

/// Event from the carrier
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierEvent {
    Connected,
    Start {
        start: StartMetadata,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    Stop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartMetadata {
    /// Caller number passed by the call webhook as a custom parameter
    #[must_use]
    pub fn caller_phone(&self) -> Option<String> {
        ["from", "From", "caller", "callerPhone"]
            .iter()
            .find_map(|key| self.custom_parameters.get(*key))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

/// Decode one carrier event; `None` for malformed JSON
#[must_use]
pub fn decode_event(text: &str) -> Option<CarrierEvent> {
    serde_json::from_str(text).ok()
}

/// Message to the carrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CarrierMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Plays agent audio into the carrier stream
pub struct CarrierSink {
    stream_sid: String,
    tx: mpsc::Sender<CarrierMessage>,
}

impl CarrierSink {
    #[must_use]
    pub const fn new(stream_sid: String, tx: mpsc::Sender<CarrierMessage>) -> Self {
        Self { stream_sid, tx }
    }

    async fn push(&self, message: CarrierMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| Error::Websocket("media stream closed".to_string()))
    }
}

#[async_trait]
impl MediaSink for CarrierSink {
    async fn send_audio(&self, frame: &[u8]) -> Result<()> {
        self.push(CarrierMessage::Media {
            stream_sid: self.stream_sid.clone(),
            media: OutboundMedia {
                payload: BASE64.encode(frame),
            },
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.push(CarrierMessage::Clear {
            stream_sid: self.stream_sid.clone(),
        })
        .await
    }
}

/// Build media stream router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice/stream", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<CarrierMessage>(OUTBOUND_BUFFER);

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut call: Option<Arc<ActiveCall>> = None;

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match decode_event(&text) {
            Some(CarrierEvent::Connected) => {
                tracing::debug!("media stream connected");
            }
            Some(CarrierEvent::Start { start }) => {
                if call.is_some() {
                    tracing::warn!(stream_id = %start.stream_sid, "duplicate start event ignored");
                    continue;
                }
                let sink = CarrierSink::new(start.stream_sid.clone(), tx.clone());
                let stream = StreamStart {
                    caller_phone: start.caller_phone(),
                    stream_id: start.stream_sid,
                    call_id: start.call_sid,
                };
                call = Some(ActiveCall::start(Arc::clone(&state.calls), Arc::new(sink), stream).await);
            }
            Some(CarrierEvent::Media { media }) => {
                let Some(call) = &call else {
                    continue;
                };
                if media.track.as_deref().is_some_and(|t| t != "inbound") {
                    continue;
                }
                match BASE64.decode(media.payload.as_bytes()) {
                    Ok(audio) => call.on_audio(audio).await,
                    Err(e) => tracing::trace!(error = %e, "dropping undecodable media payload"),
                }
            }
            Some(CarrierEvent::Mark { mark }) => {
                tracing::trace!(mark = ?mark.map(|m| m.name), "playback mark");
            }
            Some(CarrierEvent::Stop) => break,
            Some(CarrierEvent::Unknown) | None => {
                tracing::debug!("dropping unrecognized media stream event");
            }
        }
    }

    if let Some(call) = call {
        call.stop().await;
    }
    drop(tx);
    send_task.abort();
    tracing::debug!("media stream socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_start_with_caller() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ1","callSid":"CA1","accountSid":"AC1","tracks":["inbound"],"customParameters":{"from":"+15551234567"}},"streamSid":"MZ1"}"#;
        let Some(CarrierEvent::Start { start }) = decode_event(raw) else {
            panic!("expected start");
        };
        assert_eq!(start.stream_sid, "MZ1");
        assert_eq!(start.call_sid, "CA1");
        assert_eq!(start.caller_phone().as_deref(), Some("+15551234567"));
    }

    #[test]
    fn decodes_media_and_stop() {
        let raw = r#"{"event":"media","streamSid":"MZ1","media":{"track":"inbound","chunk":"2","timestamp":"20","payload":"/w=="}}"#;
        let Some(CarrierEvent::Media { media }) = decode_event(raw) else {
            panic!("expected media");
        };
        assert_eq!(BASE64.decode(media.payload).unwrap(), vec![0xFF]);
        assert_eq!(
            decode_event(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#),
            Some(CarrierEvent::Stop)
        );
    }

    #[test]
    fn unknown_and_malformed_events() {
        assert_eq!(decode_event(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#), Some(CarrierEvent::Unknown));
        assert_eq!(decode_event("not json"), None);
        assert_eq!(decode_event(r#"{"event":"media"}"#), None);
    }

    #[test]
    fn encodes_outbound_messages() {
        let clear = serde_json::to_value(CarrierMessage::Clear {
            stream_sid: "MZ1".to_string(),
        })
        .unwrap();
        assert_eq!(clear, serde_json::json!({"event": "clear", "streamSid": "MZ1"}));

        let media = serde_json::to_value(CarrierMessage::Media {
            stream_sid: "MZ1".to_string(),
            media: OutboundMedia {
                payload: BASE64.encode([0xFF, 0x7F]),
            },
        })
        .unwrap();
        assert_eq!(media["media"]["payload"], "/38=");
    }
}
