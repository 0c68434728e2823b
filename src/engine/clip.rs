//! Recorded-clip capture engine.
//!
//! One session: open the microphone, buffer PCM chunks while the endpoint
//! detector watches the level meter, then close the device, encode the clip
//! to WAV, and ship it to the transcription service. The session reports a
//! single outcome message when it is fully torn down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::microphone::{MicStream, Microphone, StreamSpec};
use crate::audio::vad::{EndpointDetector, VadConfig, VadEvent};
use crate::audio::wav;
use crate::defaults;
use crate::engine::{OutcomePayload, SessionOutcome};
use crate::error::{HarkenError, Result};
use crate::session::{CaptureSession, EngineKind, ErrorKind, Language, SessionFlags};
use crate::stt::remote::TranscriptionService;

/// Clip capture engine. Cheap to construct; each session opens its own
/// stream and owns it exclusively until teardown.
pub struct ClipEngine {
    microphone: Arc<dyn Microphone>,
    service: Arc<dyn TranscriptionService>,
    spec: StreamSpec,
    vad: VadConfig,
}

impl ClipEngine {
    pub fn new(
        microphone: Arc<dyn Microphone>,
        service: Arc<dyn TranscriptionService>,
        spec: StreamSpec,
        vad: VadConfig,
    ) -> Self {
        Self {
            microphone,
            service,
            spec,
            vad,
        }
    }

    /// Start one capture session.
    ///
    /// Opens the microphone before spawning, so a denied or missing device
    /// fails here and no session ever exists. On success the returned task
    /// runs capture to completion and sends exactly one [`SessionOutcome`],
    /// after the device has been released.
    pub async fn start(
        &self,
        session_id: u64,
        language: Language,
        flags: Arc<SessionFlags>,
        outcomes: mpsc::Sender<SessionOutcome>,
        stop: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let stream = self.microphone.open(&self.spec).await?;

        flags.set_listening(true);
        tracing::debug!(session_id, %language, "clip capture started");

        let service = Arc::clone(&self.service);
        let vad = self.vad;
        let sample_rate = self.spec.sample_rate;

        Ok(tokio::spawn(run_session(
            SessionContext {
                session_id,
                language,
                sample_rate,
                vad,
                service,
                flags,
                outcomes,
            },
            stream,
            stop,
        )))
    }
}

struct SessionContext {
    session_id: u64,
    language: Language,
    sample_rate: u32,
    vad: VadConfig,
    service: Arc<dyn TranscriptionService>,
    flags: Arc<SessionFlags>,
    outcomes: mpsc::Sender<SessionOutcome>,
}

async fn run_session(
    ctx: SessionContext,
    mut stream: Box<dyn MicStream>,
    mut stop: watch::Receiver<bool>,
) {
    let mut session =
        CaptureSession::begin(EngineKind::Clip, ctx.language, tokio::time::Instant::now());
    let meter = stream.meter();
    let mut detector = EndpointDetector::new(ctx.vad);
    let mut clip: Vec<i16> = Vec::new();

    let mut poll = tokio::time::interval(Duration::from_millis(defaults::LEVEL_POLL_INTERVAL_MS));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Chunk delivery and the level tick share exact deadlines, so
            // the poll order is fixed: stop first, then delivery, then
            // sampling.
            biased;

            // Fires on manual stop, and on Err when the controller is gone.
            _ = stop.changed() => {
                tracing::debug!(session_id = ctx.session_id, "clip capture stopped");
                break;
            }
            chunk = stream.next_chunk() => {
                match chunk {
                    Some(chunk) => clip.extend_from_slice(&chunk.samples),
                    // Device disappeared; transcribe what we have.
                    None => break,
                }
            }
            _ = poll.tick() => {
                let level = meter.sample().level_db();
                match detector.update(level) {
                    VadEvent::Endpoint => {
                        tracing::debug!(
                            session_id = ctx.session_id,
                            clip_samples = clip.len(),
                            "endpoint reached, stopping capture"
                        );
                        break;
                    }
                    VadEvent::SpeechStart => {
                        tracing::trace!(session_id = ctx.session_id, level, "speech detected");
                    }
                    VadEvent::Speech | VadEvent::Silence => {}
                }
            }
        }
    }

    // Capture phase over: release the device before the remote call so a
    // new session can start as soon as the outcome lands.
    session.begin_processing();
    ctx.flags.set_listening(false);
    ctx.flags.set_processing(true);
    // Audio captured since the last delivery still belongs to the clip.
    clip.extend_from_slice(&stream.drain());
    if let Err(error) = stream.close().await {
        tracing::warn!(session_id = ctx.session_id, %error, "microphone close failed");
    }
    drop(stream);

    let payload = match transcribe_clip(&ctx, &clip).await {
        Ok(text) => {
            session.finish();
            OutcomePayload::Transcript(text)
        }
        Err(error) => {
            tracing::warn!(session_id = ctx.session_id, %error, "clip transcription failed");
            session.fail();
            failure_payload(&error)
        }
    };

    ctx.flags.set_processing(false);
    tracing::debug!(
        session_id = ctx.session_id,
        language = %session.language,
        state = ?session.state,
        elapsed_ms = session.started_at.elapsed().as_millis() as u64,
        "clip session finished"
    );
    let _ = ctx
        .outcomes
        .send(SessionOutcome {
            session_id: ctx.session_id,
            engine: session.engine,
            payload,
        })
        .await;
}

/// Encode the collected samples and request transcription.
///
/// The clip is sent as captured, even when no audio arrived before the
/// stop; the service owns the judgement about unusable clips.
async fn transcribe_clip(ctx: &SessionContext, clip: &[i16]) -> Result<String> {
    let wav = wav::encode_clip(clip, ctx.sample_rate)?;
    tracing::debug!(
        session_id = ctx.session_id,
        clip_samples = clip.len(),
        wav_bytes = wav.len(),
        "sending clip for transcription"
    );
    ctx.service.transcribe(&wav, ctx.language).await
}

/// Map a clip-phase failure to the normalized outcome the caller sees.
fn failure_payload(error: &HarkenError) -> OutcomePayload {
    let kind = match error {
        HarkenError::EmptyTranscript
        | HarkenError::ClipEncode { .. }
        | HarkenError::TranscriptionRequest { .. }
        | HarkenError::TranscriptionStatus { .. }
        | HarkenError::TranscriptionResponse { .. } => ErrorKind::TranscriptionServiceError,
        _ => ErrorKind::Other,
    };

    let message = match error {
        HarkenError::EmptyTranscript => "No transcription received.".to_string(),
        HarkenError::ClipEncode { .. } => "Failed to process audio.".to_string(),
        _ => kind.message().to_string(),
    };

    OutcomePayload::Failure { kind, message }
}
