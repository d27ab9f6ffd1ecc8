//! Parley Gateway - Voice call and chat gateway for an AI receptionist
//!
//! This library provides the core functionality for the Parley gateway:
//! - Telephony media streams with streaming STT, paced turn-taking and TTS
//! - Caller identity, steering checklists and post-call follow-up
//! - A prioritized LLM cascade shared by voice calls and text chat
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │   /voice/stream (media WS)  │  POST /chat  │  CLI    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Parley Gateway                      │
//! │  Calls  │  Turn pacing  │  Steering  │  Agent        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                External services                     │
//! │  Deepgram  │  TTS  │  LLM cascade  │  Twilio/Resend  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod call;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod steering;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
