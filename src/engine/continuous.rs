//! Continuous recognition engine.
//!
//! Thin session wrapper over a platform [`SpeechRecognizer`]. The backend
//! segments utterances itself, so there is no endpoint detector here; the
//! session drains recognizer events, keeps the first terminal outcome, and
//! reports it once the backend signals the end of the listen.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::engine::{OutcomePayload, SessionOutcome};
use crate::error::{HarkenError, Result};
use crate::session::{CaptureSession, EngineKind, Language, SessionFlags};
use crate::stt::recognizer::{
    RecognizerControl, RecognizerEvent, RecognizerHandle, SpeechRecognizer, map_error_code,
};

/// Continuous capture engine.
pub struct ContinuousEngine {
    recognizer: Arc<dyn SpeechRecognizer>,
}

impl ContinuousEngine {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Whether the platform offers continuous recognition at all.
    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    /// Start one listening session.
    ///
    /// The recognizer is started before spawning, so backend start failures
    /// surface here and no session ever exists. The returned task reports
    /// exactly one [`SessionOutcome`] when the listen has fully ended.
    pub async fn start(
        &self,
        session_id: u64,
        language: Language,
        flags: Arc<SessionFlags>,
        outcomes: mpsc::Sender<SessionOutcome>,
        stop: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        if !self.recognizer.is_supported() {
            return Err(HarkenError::RecognizerUnsupported);
        }

        let handle = self.recognizer.start(language).await?;
        flags.set_listening(true);
        tracing::debug!(session_id, %language, "continuous recognition started");

        Ok(tokio::spawn(run_session(
            session_id, language, handle, flags, outcomes, stop,
        )))
    }
}

async fn run_session(
    session_id: u64,
    language: Language,
    mut handle: RecognizerHandle,
    flags: Arc<SessionFlags>,
    outcomes: mpsc::Sender<SessionOutcome>,
    mut stop: watch::Receiver<bool>,
) {
    let mut session = CaptureSession::begin(
        EngineKind::Continuous,
        language,
        tokio::time::Instant::now(),
    );
    // First terminal outcome of this listen; later ones are dropped.
    let mut payload: Option<OutcomePayload> = None;
    let mut stop_requested = false;
    let mut stop_closed = false;

    loop {
        tokio::select! {
            changed = stop.changed(), if !stop_closed => {
                match changed {
                    Ok(()) => {
                        // Manual stop. The backend may still flush a final
                        // result before it reports the end.
                        if !stop_requested {
                            stop_requested = true;
                            let _ = handle.control.send(RecognizerControl::Stop).await;
                        }
                    }
                    Err(_) => {
                        // Controller gone; tear down without a result.
                        if !stop_requested {
                            stop_requested = true;
                            let _ = handle.control.send(RecognizerControl::Abort).await;
                        }
                        stop_closed = true;
                    }
                }
            }
            event = handle.events.recv() => {
                match event {
                    Some(RecognizerEvent::Result { transcript }) => {
                        if payload.is_none() {
                            payload = Some(OutcomePayload::Transcript(transcript));
                        }
                    }
                    Some(RecognizerEvent::Error { code }) => {
                        if payload.is_none() {
                            let kind = map_error_code(&code);
                            tracing::debug!(session_id, code, %kind, "recognizer error");
                            payload = Some(OutcomePayload::Failure {
                                kind,
                                message: kind.message().to_string(),
                            });
                        }
                    }
                    Some(RecognizerEvent::End) | None => break,
                }
            }
        }
    }

    flags.clear();
    let payload = payload.unwrap_or(OutcomePayload::Finished);
    match &payload {
        OutcomePayload::Transcript(_) => session.finish(),
        OutcomePayload::Failure { .. } | OutcomePayload::Finished => session.fail(),
    }
    tracing::debug!(
        session_id,
        language = %session.language,
        state = ?session.state,
        elapsed_ms = session.started_at.elapsed().as_millis() as u64,
        "continuous session finished"
    );
    let _ = outcomes
        .send(SessionOutcome {
            session_id,
            engine: session.engine,
            payload,
        })
        .await;
}
