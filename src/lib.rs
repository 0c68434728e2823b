//! harken - Unified voice capture with automatic endpointing
//!
//! Two independent speech-capture mechanisms behind one controller: a
//! platform continuous recognizer, and recorded-clip capture with silence
//! endpointing and remote transcription, with automatic one-way fallback
//! from the first to the second on network failure.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod session;
pub mod stt;

// Core traits (capture → endpoint → transcribe)
pub use audio::microphone::{LevelMeter, MicStream, Microphone, StreamSpec};
pub use stt::recognizer::SpeechRecognizer;
pub use stt::remote::TranscriptionService;

// Controller
pub use controller::CaptureController;

// Caller-facing session surface
pub use session::{CaptureEvent, EngineKind, ErrorKind, Language};

// Error handling
pub use error::{HarkenError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.2.0+abc1234"` when git hash is available, `"0.2.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
