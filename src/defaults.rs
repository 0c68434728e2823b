//! Default configuration constants for harken.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default channel count. Capture is always mono.
pub const CHANNELS: u16 = 1;

/// Default silence threshold in decibels.
///
/// Level frames above this count as speech; frames at or below count as
/// silence. -45 dB is tuned for typical microphone input levels and leaves
/// room above the -100 dB floor for quiet rooms.
pub const SILENCE_THRESHOLD_DB: f32 = -45.0;

/// Default silence duration in milliseconds before speech is considered ended.
///
/// 1500ms (1.5 seconds) allows for natural pauses in speech without prematurely
/// ending the recording session.
pub const SILENCE_DURATION_MS: u64 = 1500;

/// Floor value in decibels reported for a silent (zero-amplitude) frame.
///
/// Avoids taking the log of zero; anything at the floor is far below any
/// usable threshold.
pub const DB_FLOOR: f32 = -100.0;

/// Cadence of level sampling for endpoint detection, in milliseconds.
///
/// The capture loop polls the level meter on this interval and feeds the
/// detector one frame per tick.
pub const LEVEL_POLL_INTERVAL_MS: u64 = 100;

/// Number of amplitude bins in a level frame.
///
/// Matches an analyser window of 512 samples (half the window size);
/// each bin is a normalized 0..=255 amplitude.
pub const LEVEL_BINS: usize = 256;

/// Cadence at which the microphone stream delivers buffered chunks,
/// in milliseconds.
pub const CHUNK_INTERVAL_MS: u64 = 100;

/// Default endpoint of the remote transcription function.
///
/// Points at the hosted backend's local function URL; production deployments
/// override this via config or the HARKEN_ENDPOINT environment variable.
pub const ENDPOINT: &str = "http://localhost:54321/functions/v1/voice-to-text";

/// Language code for the primary capture language.
pub const PRIMARY_LANGUAGE: &str = "en-IN";

/// Language code for the secondary capture language.
pub const SECONDARY_LANGUAGE: &str = "hi-IN";
