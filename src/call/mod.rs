//! Voice call sessions
//!
//! Identity resolution, the per-call session aggregate, its timers, the
//! process-wide registry, live orchestration, transcripts and post-call
//! follow-up.

mod followup;
mod handler;
mod identity;
mod registry;
mod session;
mod tasks;
mod transcript;

pub use followup::{FollowUp, FollowUpOutcome, send_followup};
pub use handler::{ActiveCall, CallServices, RECOVERY_LINE, StreamStart};
pub use identity::{
    AccessTier, CallerIdentity, CallerRole, ContactDirectory, TrustTier, normalize_phone,
    resolve_identity,
};
pub use registry::SessionRegistry;
pub use session::CallSession;
pub use tasks::{CallTasks, TaskSlot};
pub use transcript::{
    Transcript, TranscriptBuilder, TranscriptEntry, TranscriptRole, TranscriptStats, elapsed_label,
};
