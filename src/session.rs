//! Session data model: engine selection, capture lifecycle, and the
//! normalized event surface delivered to callers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::defaults;

/// Which speech engine a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// On-device streaming recognizer that segments utterances itself.
    Continuous,
    /// Recorded-clip capture with remote transcription.
    Clip,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Continuous => write!(f, "continuous"),
            EngineKind::Clip => write!(f, "clip"),
        }
    }
}

/// Capture language. Two values are supported; the BCP-47 code is what
/// crosses the wire and appears in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-IN")]
    English,
    #[serde(rename = "hi-IN")]
    Hindi,
}

impl Language {
    /// The BCP-47 code sent to recognizers and the transcription service.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => defaults::PRIMARY_LANGUAGE,
            Language::Hindi => defaults::SECONDARY_LANGUAGE,
        }
    }

    /// The other supported language.
    pub fn toggled(&self) -> Self {
        match self {
            Language::English => Language::Hindi,
            Language::Hindi => Language::English,
        }
    }

    /// Parse a BCP-47 code. Returns `None` for unsupported codes.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            defaults::PRIMARY_LANGUAGE => Some(Language::English),
            defaults::SECONDARY_LANGUAGE => Some(Language::Hindi),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in progress.
    Idle,
    /// Audio is being captured (or the recognizer is listening).
    Listening,
    /// Capture finished; awaiting the remote transcription result.
    Processing,
    /// Terminal: a transcript was delivered.
    Done,
    /// Terminal: an error was delivered (or the session was aborted).
    Failed,
}

impl SessionState {
    /// Whether the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// One bounded listen-to-result lifecycle.
///
/// Owned by the session task that runs it; transitions are explicit so the
/// task's control flow and the session's state can never disagree.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// Engine this session runs on. Fixed at start; fallback starts a new
    /// session rather than migrating this one.
    pub engine: EngineKind,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Language the engine was started with.
    pub language: Language,
    /// When the session entered Listening.
    pub started_at: Instant,
}

impl CaptureSession {
    /// Start a session in the Listening state.
    pub fn begin(engine: EngineKind, language: Language, now: Instant) -> Self {
        Self {
            engine,
            state: SessionState::Listening,
            language,
            started_at: now,
        }
    }

    /// Capture is done; the remote call is in flight.
    ///
    /// Only meaningful for the clip engine; the continuous engine goes
    /// straight from Listening to a terminal state.
    pub fn begin_processing(&mut self) {
        debug_assert_eq!(self.state, SessionState::Listening);
        self.state = SessionState::Processing;
    }

    /// A transcript was delivered.
    pub fn finish(&mut self) {
        self.state = SessionState::Done;
    }

    /// The session ended without a transcript.
    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }
}

/// Normalized error classification for caller-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone access was refused by the user or platform policy.
    PermissionDenied,
    /// The recognizer heard no utterance.
    NoSpeechDetected,
    /// No usable capture device exists.
    CaptureHardwareUnavailable,
    /// The continuous recognizer could not reach its service. Never
    /// surfaced raw: consumed by the engine fallback.
    NetworkUnavailable,
    /// A programmatic stop ended the recognizer mid-listen. Suppressed
    /// entirely; an expected outcome, not a failure.
    OperationAborted,
    /// The remote transcription call failed or returned no text.
    TranscriptionServiceError,
    /// Acquiring the microphone stream failed; the session never started.
    MicrophoneAccessError,
    /// Unclassified recognizer failure.
    Other,
}

impl ErrorKind {
    /// Whether the caller may sensibly retry with a fresh `start()`.
    pub fn recoverable(&self) -> bool {
        match self {
            ErrorKind::PermissionDenied => false,
            ErrorKind::NoSpeechDetected => true,
            ErrorKind::CaptureHardwareUnavailable => false,
            ErrorKind::NetworkUnavailable => false,
            ErrorKind::OperationAborted => true,
            ErrorKind::TranscriptionServiceError => true,
            ErrorKind::MicrophoneAccessError => false,
            ErrorKind::Other => true,
        }
    }

    /// Default human-readable message for this kind.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => {
                "Microphone permission denied. Please allow microphone access."
            }
            ErrorKind::NoSpeechDetected => "No speech detected. Please try again.",
            ErrorKind::CaptureHardwareUnavailable => {
                "No microphone was found. Please check your audio devices."
            }
            ErrorKind::NetworkUnavailable => "Speech service is unreachable.",
            ErrorKind::OperationAborted => "Voice capture was cancelled.",
            ErrorKind::TranscriptionServiceError => {
                "Failed to transcribe audio. Please try again."
            }
            ErrorKind::MicrophoneAccessError => {
                "Could not access microphone. Please check permissions."
            }
            ErrorKind::Other => "Voice recognition failed. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::NoSpeechDetected => "no-speech-detected",
            ErrorKind::CaptureHardwareUnavailable => "capture-hardware-unavailable",
            ErrorKind::NetworkUnavailable => "network-unavailable",
            ErrorKind::OperationAborted => "operation-aborted",
            ErrorKind::TranscriptionServiceError => "transcription-service-error",
            ErrorKind::MicrophoneAccessError => "microphone-access-error",
            ErrorKind::Other => "other",
        };
        write!(f, "{}", code)
    }
}

/// Event delivered to the caller. Audio bytes never appear here; only
/// derived text and normalized error reports cross this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A finalized transcript. At most one per session.
    Transcript { text: String, engine: EngineKind },
    /// A normalized, user-presentable error. At most one per session.
    Error { kind: ErrorKind, message: String },
    /// The controller switched engines after a continuous-recognizer
    /// network failure. Informational; not an error.
    EngineSwitched { from: EngineKind, to: EngineKind },
}

/// Observable phase flags, fed by whichever engine is active.
///
/// Shared between the controller and its session tasks; callers poll these
/// for UI disablement without knowing which engine is underneath.
#[derive(Debug, Default)]
pub struct SessionFlags {
    listening: AtomicBool,
    processing: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_listening(&self, value: bool) {
        self.listening.store(value, Ordering::SeqCst);
    }

    pub fn set_processing(&self, value: bool) {
        self.processing.store(value, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Reset both flags, used when a session reaches its terminal event.
    pub fn clear(&self) {
        self.set_listening(false);
        self.set_processing(false);
    }
}
