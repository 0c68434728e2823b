//! Capture controller: the single entry point for voice input.
//!
//! Owns engine selection, the one-session-at-a-time slot, and the fallback
//! policy. Engine sessions report through an internal outcome channel into
//! one dispatch task, which normalizes results and errors, enacts the
//! continuous-to-clip fallback, and forwards [`CaptureEvent`]s to the
//! caller. Callers never see engine internals or audio bytes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::microphone::{Microphone, StreamSpec};
use crate::audio::vad::VadConfig;
use crate::config::Config;
use crate::engine::{ClipEngine, ContinuousEngine, OutcomePayload, SessionOutcome};
use crate::error::{HarkenError, Result};
use crate::session::{CaptureEvent, EngineKind, ErrorKind, Language, SessionFlags};
use crate::stt::recognizer::SpeechRecognizer;
use crate::stt::remote::TranscriptionService;

/// Caller-facing event buffer. A slow caller backpressures dispatch rather
/// than dropping events.
const EVENT_CHANNEL_CAPACITY: usize = 32;
const OUTCOME_CHANNEL_CAPACITY: usize = 16;

fn lock_or_recover<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running session's controls, held in the controller's single slot.
struct SessionHandle {
    session_id: u64,
    engine: EngineKind,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct ControllerInner {
    continuous: ContinuousEngine,
    clip: ClipEngine,
    flags: Arc<SessionFlags>,
    engine: StdMutex<EngineKind>,
    language: StdMutex<Language>,
    /// Set once the continuous engine has failed with a network error;
    /// never cleared for the life of the process.
    fallback_latched: AtomicBool,
    /// Last delivered transcript, until the caller takes it.
    pending_transcript: StdMutex<Option<String>>,
    session: Mutex<Option<SessionHandle>>,
    next_session_id: AtomicU64,
    outcomes_tx: mpsc::Sender<SessionOutcome>,
    events_tx: mpsc::Sender<CaptureEvent>,
}

/// Voice capture orchestrator.
///
/// Construct with [`CaptureController::new`], then drive it with
/// `start`/`stop`/`toggle` and consume [`CaptureEvent`]s from the receiver
/// returned alongside it. At most one capture session is active at a time;
/// a `start` while one is active is ignored.
pub struct CaptureController {
    inner: Arc<ControllerInner>,
    dispatch: JoinHandle<()>,
}

impl CaptureController {
    /// Build a controller over the given backends.
    ///
    /// The initial engine is continuous recognition when the recognizer's
    /// capability probe passes, otherwise clip capture. Must be called
    /// within a tokio runtime; the dispatch task is spawned here.
    pub fn new(
        config: Config,
        recognizer: Arc<dyn SpeechRecognizer>,
        microphone: Arc<dyn Microphone>,
        service: Arc<dyn TranscriptionService>,
    ) -> Result<(Self, mpsc::Receiver<CaptureEvent>)> {
        config.validate()?;

        let spec = StreamSpec {
            device: config.audio.device.clone(),
            ..StreamSpec::default()
        };
        let continuous = ContinuousEngine::new(recognizer);
        let clip = ClipEngine::new(microphone, service, spec, VadConfig::from(&config.capture));

        let engine = if continuous.is_supported() {
            EngineKind::Continuous
        } else {
            EngineKind::Clip
        };
        tracing::info!(%engine, language = %config.capture.language, "voice capture ready");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outcomes_tx, outcomes_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);

        let inner = Arc::new(ControllerInner {
            continuous,
            clip,
            flags: SessionFlags::new(),
            engine: StdMutex::new(engine),
            language: StdMutex::new(config.capture.language),
            fallback_latched: AtomicBool::new(false),
            pending_transcript: StdMutex::new(None),
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(0),
            outcomes_tx,
            events_tx,
        });

        let dispatch = tokio::spawn(run_dispatch(Arc::clone(&inner), outcomes_rx));
        Ok((Self { inner, dispatch }, events_rx))
    }

    /// Begin a capture session on the active engine.
    ///
    /// Ignored when a session is already active. Failures to bring the
    /// engine up (denied microphone, unsupported recognizer) surface here;
    /// once a session is running, its outcome arrives as an event instead.
    pub async fn start(&self) -> Result<()> {
        self.inner.start_current().await
    }

    /// Stop the active session, if any.
    ///
    /// Safe to call repeatedly and from any state. For clip capture this
    /// triggers the transcription phase; for continuous recognition the
    /// backend may still flush a final result.
    pub async fn stop(&self) {
        let slot = self.inner.session.lock().await;
        if let Some(handle) = slot.as_ref() {
            tracing::debug!(
                session_id = handle.session_id,
                engine = %handle.engine,
                "stop requested"
            );
            let _ = handle.stop.send(true);
        }
    }

    /// Mic-button semantics: stop when listening, otherwise start.
    pub async fn toggle(&self) -> Result<()> {
        if self.is_listening() {
            self.stop().await;
            Ok(())
        } else {
            self.start().await
        }
    }

    /// Whether audio is currently being captured.
    pub fn is_listening(&self) -> bool {
        self.inner.flags.is_listening()
    }

    /// Whether a clip is awaiting its transcription result.
    pub fn is_processing(&self) -> bool {
        self.inner.flags.is_processing()
    }

    /// Listening or processing.
    pub fn is_active(&self) -> bool {
        self.is_listening() || self.is_processing()
    }

    /// The engine new sessions will run on.
    pub fn engine(&self) -> EngineKind {
        *lock_or_recover(&self.inner.engine)
    }

    /// Whether the platform supports the continuous engine at all.
    pub fn continuous_supported(&self) -> bool {
        self.inner.continuous.is_supported()
    }

    /// Whether the automatic continuous-to-clip switch has occurred.
    pub fn fallback_latched(&self) -> bool {
        self.inner.fallback_latched.load(Ordering::SeqCst)
    }

    /// Select the engine for future sessions.
    ///
    /// Rejected while a session is active, and when asking for the
    /// continuous engine on a platform without one. Selecting the
    /// continuous engine manually is allowed even after the automatic
    /// fallback; only the automatic path is one-directional.
    pub async fn set_engine(&self, engine: EngineKind) -> Result<()> {
        let slot = self.inner.session.lock().await;
        if let Some(handle) = slot.as_ref()
            && !handle.task.is_finished()
        {
            return Err(HarkenError::SessionActive);
        }
        if engine == EngineKind::Continuous && !self.inner.continuous.is_supported() {
            return Err(HarkenError::RecognizerUnsupported);
        }

        *lock_or_recover(&self.inner.engine) = engine;
        tracing::debug!(%engine, "engine selected");
        Ok(())
    }

    /// Switch to the other engine. Same restrictions as [`set_engine`].
    ///
    /// [`set_engine`]: CaptureController::set_engine
    pub async fn toggle_engine(&self) -> Result<EngineKind> {
        let target = match self.engine() {
            EngineKind::Continuous => EngineKind::Clip,
            EngineKind::Clip => EngineKind::Continuous,
        };
        self.set_engine(target).await?;
        Ok(target)
    }

    /// The language new sessions will be recognized in.
    pub fn language(&self) -> Language {
        *lock_or_recover(&self.inner.language)
    }

    /// Set the capture language. Applies from the next session.
    pub fn set_language(&self, language: Language) {
        *lock_or_recover(&self.inner.language) = language;
    }

    /// Flip between the two supported languages; returns the new one.
    pub fn toggle_language(&self) -> Language {
        let mut guard = lock_or_recover(&self.inner.language);
        *guard = guard.toggled();
        *guard
    }

    /// Whether a delivered transcript is waiting to be taken.
    ///
    /// Lets the caller implement stop-time policies such as auto-submitting
    /// whatever the last listen produced.
    pub fn has_pending_transcript(&self) -> bool {
        lock_or_recover(&self.inner.pending_transcript).is_some()
    }

    /// Take the pending transcript, clearing it.
    pub fn take_pending_transcript(&self) -> Option<String> {
        lock_or_recover(&self.inner.pending_transcript).take()
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        // Dropping the inner state afterwards closes the session's stop
        // channel, which winds the session task down on its own.
        self.dispatch.abort();
    }
}

#[cfg(feature = "cpal-audio")]
impl CaptureController {
    /// Wire up a controller with the real microphone and HTTP service.
    ///
    /// Platforms without a continuous recognizer start directly on the
    /// clip engine; pass a recognizer to [`CaptureController::new`] to
    /// enable the continuous path.
    pub fn from_config(config: Config) -> Result<(Self, mpsc::Receiver<CaptureEvent>)> {
        use crate::audio::cpal_mic::CpalMicrophone;
        use crate::stt::recognizer::UnsupportedRecognizer;
        use crate::stt::remote::HttpTranscriptionService;

        let microphone = Arc::new(CpalMicrophone::new(config.audio.device.clone()));
        let service = Arc::new(HttpTranscriptionService::new(&config.service)?);
        Self::new(config, Arc::new(UnsupportedRecognizer), microphone, service)
    }
}

impl ControllerInner {
    /// Start a session on the currently selected engine.
    ///
    /// The slot lock is held across engine startup, so two racing starts
    /// can never both open the device.
    async fn start_current(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        if let Some(handle) = slot.as_ref() {
            if handle.task.is_finished() {
                // Outcome already delivered; slot not swept yet.
                *slot = None;
            } else {
                tracing::debug!(
                    session_id = handle.session_id,
                    "capture already active, ignoring start"
                );
                return Ok(());
            }
        }

        let engine = *lock_or_recover(&self.engine);
        let language = *lock_or_recover(&self.language);
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = match engine {
            EngineKind::Continuous => {
                self.continuous
                    .start(
                        session_id,
                        language,
                        Arc::clone(&self.flags),
                        self.outcomes_tx.clone(),
                        stop_rx,
                    )
                    .await?
            }
            EngineKind::Clip => {
                self.clip
                    .start(
                        session_id,
                        language,
                        Arc::clone(&self.flags),
                        self.outcomes_tx.clone(),
                        stop_rx,
                    )
                    .await?
            }
        };

        // A new capture supersedes whatever the last one produced.
        *lock_or_recover(&self.pending_transcript) = None;
        *slot = Some(SessionHandle {
            session_id,
            engine,
            stop: stop_tx,
            task,
        });
        Ok(())
    }

    /// Free the slot if it still belongs to the given session.
    async fn clear_session(&self, session_id: u64) {
        let mut slot = self.session.lock().await;
        if slot
            .as_ref()
            .is_some_and(|handle| handle.session_id == session_id)
        {
            *slot = None;
        }
    }

    /// Permanent continuous-to-clip switch, then an immediate clip capture
    /// so the user's in-progress attempt is not lost.
    async fn fall_back_to_clip(&self) {
        self.fallback_latched.store(true, Ordering::SeqCst);
        *lock_or_recover(&self.engine) = EngineKind::Clip;
        tracing::info!("recognizer network failure, switching to clip capture");

        let _ = self
            .events_tx
            .send(CaptureEvent::EngineSwitched {
                from: EngineKind::Continuous,
                to: EngineKind::Clip,
            })
            .await;

        if let Err(error) = self.start_current().await {
            tracing::warn!(%error, "fallback capture failed to start");
            let kind = start_failure_kind(&error);
            let _ = self
                .events_tx
                .send(CaptureEvent::Error {
                    kind,
                    message: kind.message().to_string(),
                })
                .await;
        }
    }
}

/// Normalize a session-start failure for event reporting.
fn start_failure_kind(error: &HarkenError) -> ErrorKind {
    match error {
        HarkenError::AudioDeviceNotFound { .. } => ErrorKind::CaptureHardwareUnavailable,
        HarkenError::MicrophoneAccess { .. } | HarkenError::AudioCapture { .. } => {
            ErrorKind::MicrophoneAccessError
        }
        _ => ErrorKind::Other,
    }
}

/// The controller's single decision point.
///
/// Consumes session outcomes in order: sweeps the session slot, records
/// transcripts, suppresses aborted listens, enacts the fallback rule, and
/// forwards everything else to the caller.
async fn run_dispatch(inner: Arc<ControllerInner>, mut outcomes: mpsc::Receiver<SessionOutcome>) {
    while let Some(outcome) = outcomes.recv().await {
        inner.clear_session(outcome.session_id).await;

        match outcome.payload {
            OutcomePayload::Transcript(text) => {
                tracing::debug!(
                    session_id = outcome.session_id,
                    engine = %outcome.engine,
                    "transcript delivered"
                );
                *lock_or_recover(&inner.pending_transcript) = Some(text.clone());
                let _ = inner
                    .events_tx
                    .send(CaptureEvent::Transcript {
                        text,
                        engine: outcome.engine,
                    })
                    .await;
            }
            OutcomePayload::Failure {
                kind: ErrorKind::OperationAborted,
                ..
            } => {
                // Expected consequence of a programmatic stop.
                tracing::debug!(session_id = outcome.session_id, "aborted listen suppressed");
            }
            OutcomePayload::Failure {
                kind: ErrorKind::NetworkUnavailable,
                ..
            } if outcome.engine == EngineKind::Continuous => {
                inner.fall_back_to_clip().await;
            }
            OutcomePayload::Failure { kind, message } => {
                let _ = inner
                    .events_tx
                    .send(CaptureEvent::Error { kind, message })
                    .await;
            }
            OutcomePayload::Finished => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::microphone::MockMicrophone;
    use crate::stt::recognizer::MockRecognizer;
    use crate::stt::remote::MockTranscriptionService;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TryRecvError;

    fn build(
        recognizer: MockRecognizer,
        mic: MockMicrophone,
        service: MockTranscriptionService,
    ) -> (CaptureController, mpsc::Receiver<CaptureEvent>) {
        CaptureController::new(
            Config::default(),
            Arc::new(recognizer),
            Arc::new(mic),
            Arc::new(service),
        )
        .unwrap()
    }

    fn clip_only(
        mic: MockMicrophone,
        service: MockTranscriptionService,
    ) -> (CaptureController, mpsc::Receiver<CaptureEvent>) {
        build(MockRecognizer::unsupported(), mic, service)
    }

    #[tokio::test]
    async fn test_initial_engine_prefers_continuous() {
        let (controller, _events) = build(
            MockRecognizer::new(),
            MockMicrophone::new(),
            MockTranscriptionService::new(),
        );
        assert_eq!(controller.engine(), EngineKind::Continuous);
        assert!(controller.continuous_supported());
        assert!(!controller.fallback_latched());
    }

    #[tokio::test]
    async fn test_initial_engine_clip_when_unsupported() {
        let (controller, _events) =
            clip_only(MockMicrophone::new(), MockTranscriptionService::new());
        assert_eq!(controller.engine(), EngineKind::Clip);
        assert!(!controller.continuous_supported());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.capture.silence_threshold_db = 5.0;

        let result = CaptureController::new(
            config,
            Arc::new(MockRecognizer::new()),
            Arc::new(MockMicrophone::new()),
            Arc::new(MockTranscriptionService::new()),
        );
        assert!(matches!(
            result,
            Err(HarkenError::ConfigInvalidValue { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_while_active() {
        let recognizer = MockRecognizer::new();
        let (controller, _events) = build(
            recognizer.clone(),
            MockMicrophone::new(),
            MockTranscriptionService::new(),
        );

        controller.start().await.unwrap();
        controller.start().await.unwrap();
        controller.start().await.unwrap();

        assert_eq!(recognizer.start_count(), 1);
        assert!(controller.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_from_any_state() {
        let (controller, mut events) =
            clip_only(MockMicrophone::new(), MockTranscriptionService::new());

        // Idle stop is a no-op.
        controller.stop().await;
        controller.stop().await;
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);

        controller.start().await.unwrap();
        controller.stop().await;
        controller.stop().await;

        // One session, one outcome.
        assert!(matches!(
            events.recv().await,
            Some(CaptureEvent::Transcript { .. })
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_round_trip_delivers_transcript() {
        let service = MockTranscriptionService::new().with_response("hello");
        let (controller, mut events) = clip_only(MockMicrophone::new(), service.clone());

        controller.start().await.unwrap();
        assert!(controller.is_listening());

        controller.stop().await;
        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::Transcript {
                text: "hello".to_string(),
                engine: EngineKind::Clip,
            })
        );

        assert!(controller.has_pending_transcript());
        assert_eq!(controller.take_pending_transcript().as_deref(), Some("hello"));
        assert!(!controller.has_pending_transcript());
        assert_eq!(controller.take_pending_transcript(), None);
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_start_discards_stale_pending_transcript() {
        let service = MockTranscriptionService::new().with_response("first take");
        let (controller, mut events) = clip_only(MockMicrophone::new(), service);

        controller.start().await.unwrap();
        controller.stop().await;
        assert!(matches!(
            events.recv().await,
            Some(CaptureEvent::Transcript { .. })
        ));
        assert!(controller.has_pending_transcript());

        // An untaken transcript does not leak into the next capture.
        controller.start().await.unwrap();
        assert!(!controller.has_pending_transcript());
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_yields_single_error() {
        let service = MockTranscriptionService::new().with_request_failure("down");
        let (controller, mut events) = clip_only(MockMicrophone::new(), service);

        controller.start().await.unwrap();
        controller.stop().await;

        match events.recv().await {
            Some(CaptureEvent::Error { kind, .. }) => {
                assert_eq!(kind, ErrorKind::TranscriptionServiceError);
            }
            other => panic!("Expected error event, got {:?}", other),
        }

        // No transcript, and nothing further.
        assert!(!controller.has_pending_transcript());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_transcript_flows_through() {
        let (controller, mut events) = build(
            MockRecognizer::new().with_transcript("namaste"),
            MockMicrophone::new(),
            MockTranscriptionService::new(),
        );

        controller.start().await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::Transcript {
                text: "namaste".to_string(),
                engine: EngineKind::Continuous,
            })
        );

        // Session over: a fresh start is accepted.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_listen_is_silent() {
        let recognizer = MockRecognizer::new().with_error("aborted");
        let (controller, mut events) = build(
            recognizer.clone(),
            MockMicrophone::new(),
            MockTranscriptionService::new(),
        );

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Zero caller-facing events, and the session is fully cleaned up.
        assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(!controller.is_active());

        controller.start().await.unwrap();
        assert_eq!(recognizer.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_switches_to_clip_permanently() {
        let recognizer = MockRecognizer::new().with_error("network");
        let service = MockTranscriptionService::new().with_response("fallback words");
        let (controller, mut events) =
            build(recognizer.clone(), MockMicrophone::new(), service.clone());

        assert_eq!(controller.engine(), EngineKind::Continuous);
        controller.start().await.unwrap();

        // The switch notice arrives before anything else.
        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::EngineSwitched {
                from: EngineKind::Continuous,
                to: EngineKind::Clip,
            })
        );
        assert_eq!(controller.engine(), EngineKind::Clip);
        assert!(controller.fallback_latched());

        // A clip capture began on its own.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(controller.is_listening());

        controller.stop().await;
        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::Transcript {
                text: "fallback words".to_string(),
                engine: EngineKind::Clip,
            })
        );

        // The continuous engine is never retried automatically.
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.start().await.unwrap();
        controller.stop().await;
        events.recv().await.unwrap();
        assert_eq!(recognizer.start_count(), 1);
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_capture_failure_is_reported() {
        let recognizer = MockRecognizer::new().with_error("network");
        let mic = MockMicrophone::new()
            .with_open_failure()
            .with_error_message("denied");
        let (controller, mut events) =
            build(recognizer, mic, MockTranscriptionService::new());

        controller.start().await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::EngineSwitched {
                from: EngineKind::Continuous,
                to: EngineKind::Clip,
            })
        );
        match events.recv().await {
            Some(CaptureEvent::Error { kind, .. }) => {
                assert_eq!(kind, ErrorKind::MicrophoneAccessError);
            }
            other => panic!("Expected error event, got {:?}", other),
        }
        assert!(!controller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_toggle_only_when_idle() {
        let (controller, _events) = build(
            MockRecognizer::new(),
            MockMicrophone::new(),
            MockTranscriptionService::new(),
        );

        assert_eq!(controller.toggle_engine().await.unwrap(), EngineKind::Clip);
        assert_eq!(
            controller.toggle_engine().await.unwrap(),
            EngineKind::Continuous
        );

        controller.start().await.unwrap();
        assert!(matches!(
            controller.toggle_engine().await,
            Err(HarkenError::SessionActive)
        ));
        assert!(matches!(
            controller.set_engine(EngineKind::Clip).await,
            Err(HarkenError::SessionActive)
        ));
    }

    #[tokio::test]
    async fn test_set_engine_rejects_unsupported_continuous() {
        let (controller, _events) =
            clip_only(MockMicrophone::new(), MockTranscriptionService::new());

        assert!(matches!(
            controller.set_engine(EngineKind::Continuous).await,
            Err(HarkenError::RecognizerUnsupported)
        ));
        assert!(matches!(
            controller.toggle_engine().await,
            Err(HarkenError::RecognizerUnsupported)
        ));
        assert_eq!(controller.engine(), EngineKind::Clip);
    }

    #[tokio::test(start_paused = true)]
    async fn test_language_applies_to_next_session() {
        let service = MockTranscriptionService::new();
        let (controller, mut events) = clip_only(MockMicrophone::new(), service.clone());

        assert_eq!(controller.language(), Language::English);
        assert_eq!(controller.toggle_language(), Language::Hindi);

        controller.start().await.unwrap();
        controller.stop().await;
        events.recv().await.unwrap();

        assert_eq!(service.requests()[0].language, Language::Hindi);

        controller.set_language(Language::English);
        controller.start().await.unwrap();
        controller.stop().await;
        events.recv().await.unwrap();

        assert_eq!(service.requests()[1].language, Language::English);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_surfaces_and_allows_retry() {
        let mic = MockMicrophone::new()
            .with_open_failure()
            .with_error_message("no permission");
        let (controller, _events) = clip_only(mic, MockTranscriptionService::new());

        let result = controller.start().await;
        assert!(matches!(result, Err(HarkenError::MicrophoneAccess { .. })));
        assert!(!controller.is_active());

        // The failed start left no half-open session behind.
        let result = controller.start().await;
        assert!(matches!(result, Err(HarkenError::MicrophoneAccess { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejected_while_processing() {
        let mic = MockMicrophone::new();
        let service = MockTranscriptionService::new().with_delay(Duration::from_millis(500));
        let (controller, mut events) = clip_only(mic.clone(), service.clone());

        controller.start().await.unwrap();
        controller.stop().await;

        // Enter the processing window.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(controller.is_processing());

        // A start during processing is ignored; no second capture opens.
        controller.start().await.unwrap();
        assert_eq!(mic.open_count(), 1);

        events.recv().await.unwrap();
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_after_each_outcome() {
        let service = MockTranscriptionService::new();
        let (controller, mut events) = clip_only(MockMicrophone::new(), service.clone());

        for _ in 0..3 {
            controller.start().await.unwrap();
            controller.stop().await;
            assert!(matches!(
                events.recv().await,
                Some(CaptureEvent::Transcript { .. })
            ));
        }
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_follows_mic_button_semantics() {
        let service = MockTranscriptionService::new().with_response("toggled");
        let (controller, mut events) = clip_only(MockMicrophone::new(), service);

        controller.toggle().await.unwrap();
        assert!(controller.is_listening());

        controller.toggle().await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(CaptureEvent::Transcript {
                text: "toggled".to_string(),
                engine: EngineKind::Clip,
            })
        );
    }
}
