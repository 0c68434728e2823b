//! Silence endpointing over the live level stream.
//!
//! Classifies each sampled level frame as speech or silence against a dB
//! threshold and signals "endpoint reached" after a continuous run of
//! silence follows detected speech. No endpoint is ever produced before
//! speech has been heard, so ambient noise alone cannot stop a capture.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::CaptureConfig;
use crate::defaults;

/// Trait for time operations, allowing mock time in tests.
///
/// The production clock reads `tokio::time::Instant`, so tests running on a
/// paused runtime get deterministic silence timing for free.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real clock backed by the tokio time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Configuration for endpoint detection.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Levels above this are speech; at or below is silence (decibels).
    pub silence_threshold_db: f32,
    /// Continuous silence required after speech before the endpoint fires.
    pub silence_duration: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            silence_duration: Duration::from_millis(defaults::SILENCE_DURATION_MS),
        }
    }
}

impl From<&CaptureConfig> for VadConfig {
    fn from(capture: &CaptureConfig) -> Self {
        Self {
            silence_threshold_db: capture.silence_threshold_db,
            silence_duration: Duration::from_millis(capture.silence_duration_ms),
        }
    }
}

/// Current state of endpoint detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Nothing above the threshold heard yet.
    AwaitingSpeech,
    /// Speech has been detected and is ongoing.
    Speaking,
    /// Silence after speech; the endpoint timer is running.
    TrailingSilence,
    /// The endpoint fired. The detector stays here until reset.
    Ended,
}

/// Classification of one level frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// At/below threshold, no endpoint implication.
    Silence,
    /// First frame above the threshold.
    SpeechStart,
    /// Above threshold while already voiced.
    Speech,
    /// The trailing silence reached the configured duration. Fires exactly
    /// once per detector lifetime.
    Endpoint,
}

/// Endpoint detector state machine.
pub struct EndpointDetector<C: Clock = SystemClock> {
    config: VadConfig,
    state: VadState,
    silence_start: Option<Instant>,
    clock: C,
}

impl<C: Clock> EndpointDetector<C> {
    /// Creates a detector with the given configuration and clock.
    pub fn with_clock(config: VadConfig, clock: C) -> Self {
        Self {
            config,
            state: VadState::AwaitingSpeech,
            silence_start: None,
            clock,
        }
    }

    /// Feed one sampled level and get its classification.
    ///
    /// Call this once per level-poll tick; the silence window is measured in
    /// wall-clock time between ticks, not in tick counts.
    pub fn update(&mut self, level_db: f32) -> VadEvent {
        let is_speech = level_db > self.config.silence_threshold_db;
        let now = self.clock.now();

        match self.state {
            VadState::AwaitingSpeech => {
                if is_speech {
                    self.state = VadState::Speaking;
                    VadEvent::SpeechStart
                } else {
                    VadEvent::Silence
                }
            }
            VadState::Speaking => {
                if is_speech {
                    VadEvent::Speech
                } else {
                    self.state = VadState::TrailingSilence;
                    self.silence_start = Some(now);
                    VadEvent::Silence
                }
            }
            VadState::TrailingSilence => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.silence_start = None;
                    VadEvent::Speech
                } else {
                    let elapsed = self
                        .silence_start
                        .map(|start| now.duration_since(start))
                        .unwrap_or(Duration::ZERO);

                    if elapsed >= self.config.silence_duration {
                        self.state = VadState::Ended;
                        self.silence_start = None;
                        VadEvent::Endpoint
                    } else {
                        VadEvent::Silence
                    }
                }
            }
            VadState::Ended => VadEvent::Silence,
        }
    }

    /// Returns the current detector state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Whether any speech has been detected since the last reset.
    pub fn has_spoken(&self) -> bool {
        !matches!(self.state, VadState::AwaitingSpeech)
    }

    /// How long the current trailing-silence run has lasted, if one is
    /// in progress.
    pub fn silence_elapsed(&self) -> Option<Duration> {
        self.silence_start
            .map(|start| self.clock.now().duration_since(start))
    }

    /// Returns the detector to the awaiting-speech state.
    pub fn reset(&mut self) {
        self.state = VadState::AwaitingSpeech;
        self.silence_start = None;
    }
}

impl EndpointDetector<SystemClock> {
    /// Creates a detector with the given configuration using the system clock.
    pub fn new(config: VadConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock clock for testing that allows manual time advancement.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        /// Creates a new mock clock starting at the current instant.
        pub fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(Instant::now())),
            }
        }

        /// Advances the mock clock by the given duration.
        pub fn advance(&self, duration: Duration) {
            let mut current = self.current.lock().unwrap();
            *current += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap()
        }
    }

    const SPEECH_DB: f32 = -20.0;
    const QUIET_DB: f32 = -60.0;

    fn test_config() -> VadConfig {
        VadConfig {
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            silence_duration: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_detector_starts_awaiting_speech() {
        let detector = EndpointDetector::new(test_config());
        assert_eq!(detector.state(), VadState::AwaitingSpeech);
        assert!(!detector.has_spoken());
    }

    #[test]
    fn test_detects_speech_start() {
        let mut detector = EndpointDetector::new(test_config());

        assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);
        assert_eq!(detector.state(), VadState::AwaitingSpeech);

        assert_eq!(detector.update(SPEECH_DB), VadEvent::SpeechStart);
        assert_eq!(detector.state(), VadState::Speaking);
        assert!(detector.has_spoken());
    }

    #[test]
    fn test_level_at_threshold_is_silence() {
        // Speech requires strictly exceeding the threshold.
        let mut detector = EndpointDetector::new(test_config());
        assert_eq!(
            detector.update(defaults::SILENCE_THRESHOLD_DB),
            VadEvent::Silence
        );
        assert!(!detector.has_spoken());
    }

    #[test]
    fn test_stays_speaking_during_speech() {
        let mut detector = EndpointDetector::new(test_config());

        assert_eq!(detector.update(SPEECH_DB), VadEvent::SpeechStart);
        assert_eq!(detector.update(SPEECH_DB), VadEvent::Speech);
        assert_eq!(detector.update(SPEECH_DB), VadEvent::Speech);
        assert_eq!(detector.state(), VadState::Speaking);
    }

    #[test]
    fn test_trailing_silence_after_speech() {
        let mut detector = EndpointDetector::new(test_config());

        detector.update(SPEECH_DB);
        assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);
        assert_eq!(detector.state(), VadState::TrailingSilence);
        assert!(detector.silence_elapsed().is_some());
    }

    #[test]
    fn test_speech_resume_clears_silence_timer() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        detector.update(SPEECH_DB);
        detector.update(QUIET_DB);
        clock.advance(Duration::from_millis(1400));

        // Speech resumes just before the window closes
        assert_eq!(detector.update(SPEECH_DB), VadEvent::Speech);
        assert_eq!(detector.state(), VadState::Speaking);
        assert!(detector.silence_elapsed().is_none());

        // A fresh silence run must wait the full duration again
        detector.update(QUIET_DB);
        clock.advance(Duration::from_millis(1400));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);
        clock.advance(Duration::from_millis(100));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Endpoint);
    }

    #[test]
    fn test_endpoint_fires_after_silence_duration() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        detector.update(SPEECH_DB);
        detector.update(QUIET_DB);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Endpoint);
        assert_eq!(detector.state(), VadState::Ended);
    }

    #[test]
    fn test_endpoint_never_fires_early() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        detector.update(SPEECH_DB);
        detector.update(QUIET_DB);

        clock.advance(Duration::from_millis(1499));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);

        clock.advance(Duration::from_millis(1));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Endpoint);
    }

    #[test]
    fn test_endpoint_fires_exactly_once() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        detector.update(SPEECH_DB);
        detector.update(QUIET_DB);
        clock.advance(Duration::from_millis(2000));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Endpoint);

        // Ended state keeps reporting silence, even for loud frames
        clock.advance(Duration::from_millis(2000));
        assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);
        assert_eq!(detector.update(SPEECH_DB), VadEvent::Silence);
        assert_eq!(detector.state(), VadState::Ended);
    }

    #[test]
    fn test_no_endpoint_without_speech() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        // Minutes of pure silence never trigger an endpoint
        for _ in 0..100 {
            clock.advance(Duration::from_millis(1500));
            assert_eq!(detector.update(QUIET_DB), VadEvent::Silence);
        }
        assert_eq!(detector.state(), VadState::AwaitingSpeech);
    }

    #[test]
    fn test_reset_returns_to_awaiting_speech() {
        let clock = MockClock::new();
        let mut detector = EndpointDetector::with_clock(test_config(), clock.clone());

        detector.update(SPEECH_DB);
        detector.update(QUIET_DB);
        clock.advance(Duration::from_millis(1500));
        detector.update(QUIET_DB);
        assert_eq!(detector.state(), VadState::Ended);

        detector.reset();
        assert_eq!(detector.state(), VadState::AwaitingSpeech);
        assert!(!detector.has_spoken());
        assert!(detector.silence_elapsed().is_none());

        assert_eq!(detector.update(SPEECH_DB), VadEvent::SpeechStart);
    }

    #[test]
    fn test_config_from_capture_config() {
        let capture = CaptureConfig {
            language: crate::session::Language::English,
            silence_threshold_db: -50.0,
            silence_duration_ms: 900,
        };
        let config = VadConfig::from(&capture);
        assert_eq!(config.silence_threshold_db, -50.0);
        assert_eq!(config.silence_duration, Duration::from_millis(900));
    }
}
