//! Capture engines.
//!
//! Both engines run one session as a spawned task and report through the
//! same message type, so the controller has a single decision point for
//! normalization, fallback, and session accounting. A session task sends
//! exactly one [`SessionOutcome`], and only after its resources (device,
//! recognizer handle, timers) are released.

pub mod clip;
pub mod continuous;

use crate::session::{EngineKind, ErrorKind};

/// Terminal report from one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Which session this belongs to. Guards against a stale session's
    /// report clearing a newer session's slot.
    pub session_id: u64,
    pub engine: EngineKind,
    pub payload: OutcomePayload,
}

/// What the session produced.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomePayload {
    /// A transcript was produced.
    Transcript(String),
    /// The session failed; kind and message are already normalized.
    Failure { kind: ErrorKind, message: String },
    /// The session ended with nothing to report (stopped before any
    /// outcome, or the backend ended the listen silently).
    Finished,
}

pub use clip::ClipEngine;
pub use continuous::ContinuousEngine;
