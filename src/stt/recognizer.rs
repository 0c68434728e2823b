//! Platform speech recognizer abstraction (continuous recognition).
//!
//! Desktop environments differ in what they offer for live speech
//! recognition, so the continuous engine talks to a [`SpeechRecognizer`]
//! trait rather than a concrete backend. Hosts with a platform recognizer
//! implement the trait; hosts without one use [`UnsupportedRecognizer`],
//! which makes the capability probe report false.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{HarkenError, Result};
use crate::session::{ErrorKind, Language};

/// Events emitted by a recognizer over the course of one listen.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// A final transcript was produced.
    Result { transcript: String },
    /// Recognition failed with a backend error code.
    Error { code: String },
    /// The session ended (no further events will arrive).
    End,
}

/// Control messages for a running recognizer session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecognizerControl {
    /// Finish listening. The recognizer may still flush a final result.
    Stop,
    /// Tear down immediately, discarding any pending result.
    Abort,
}

/// Channel pair for one recognition session.
pub struct RecognizerHandle {
    /// Recognition events, ending with [`RecognizerEvent::End`].
    pub events: mpsc::Receiver<RecognizerEvent>,
    /// Control channel back into the recognizer.
    pub control: mpsc::Sender<RecognizerControl>,
}

/// Trait for platform continuous speech recognition.
///
/// This trait allows swapping implementations (a real platform backend
/// vs mock).
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether continuous recognition is available on this platform.
    ///
    /// Must be cheap and must not prompt for permissions.
    fn is_supported(&self) -> bool;

    /// Start a recognition session in the given language.
    ///
    /// # Returns
    /// A handle whose event stream carries at most one terminal outcome
    /// before [`RecognizerEvent::End`].
    async fn start(&self, language: Language) -> Result<RecognizerHandle>;
}

/// Map a recognizer backend error code to a normalized error kind.
///
/// The codes follow the vocabulary platform recognizers report
/// ("no-speech", "not-allowed", "network", ...). Unknown codes map to
/// [`ErrorKind::Other`].
pub fn map_error_code(code: &str) -> ErrorKind {
    match code {
        "not-allowed" | "service-not-allowed" => ErrorKind::PermissionDenied,
        "no-speech" => ErrorKind::NoSpeechDetected,
        "audio-capture" => ErrorKind::CaptureHardwareUnavailable,
        "network" => ErrorKind::NetworkUnavailable,
        "aborted" => ErrorKind::OperationAborted,
        _ => ErrorKind::Other,
    }
}

/// Recognizer for platforms with no continuous recognition backend.
///
/// The capability probe reports false and `start` always fails, which
/// steers the controller to the clip engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self, _language: Language) -> Result<RecognizerHandle> {
        Err(HarkenError::RecognizerUnsupported)
    }
}

#[derive(Debug, Clone)]
enum ScriptedEvent {
    Result(String),
    Error(String),
}

/// Mock recognizer for testing.
///
/// Emits a scripted sequence of events with a configurable delay between
/// them, then ends the session like a self-segmenting backend would. With
/// an empty script it listens until stopped; a pending "result on stop"
/// models backends that flush a final transcript after `stop()`.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    supported: bool,
    start_failure: Option<String>,
    scripted: Vec<ScriptedEvent>,
    event_delay: Duration,
    result_on_stop: Option<String>,
    starts: Arc<AtomicUsize>,
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRecognizer {
    /// Create a supported recognizer with no scripted events.
    pub fn new() -> Self {
        Self {
            supported: true,
            start_failure: None,
            scripted: Vec::new(),
            event_delay: Duration::from_millis(10),
            result_on_stop: None,
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a recognizer whose capability probe reports false.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Script a final transcript event.
    pub fn with_transcript(mut self, text: &str) -> Self {
        self.scripted.push(ScriptedEvent::Result(text.to_string()));
        self
    }

    /// Script an error event with a backend error code.
    pub fn with_error(mut self, code: &str) -> Self {
        self.scripted.push(ScriptedEvent::Error(code.to_string()));
        self
    }

    /// Set the delay before each scripted event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Deliver a final transcript when Stop arrives instead of up front.
    pub fn with_result_on_stop(mut self, text: &str) -> Self {
        self.result_on_stop = Some(text.to_string());
        self
    }

    /// Configure `start` to fail with the given backend code.
    pub fn with_start_failure(mut self, code: &str) -> Self {
        self.start_failure = Some(code.to_string());
        self
    }

    /// Number of sessions started so far.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn start(&self, _language: Language) -> Result<RecognizerHandle> {
        if !self.supported {
            return Err(HarkenError::RecognizerUnsupported);
        }
        if let Some(code) = &self.start_failure {
            return Err(HarkenError::Recognizer { code: code.clone() });
        }
        self.starts.fetch_add(1, Ordering::SeqCst);

        let (event_tx, event_rx) = mpsc::channel(8);
        let (control_tx, mut control_rx) = mpsc::channel(4);

        let scripted = self.scripted.clone();
        let delay = self.event_delay;
        let mut result_on_stop = self.result_on_stop.clone();

        tokio::spawn(async move {
            let had_script = !scripted.is_empty();
            let mut script = scripted.into_iter();
            loop {
                let Some(event) = script.next() else {
                    // A recognizer that produced its outcome ends the
                    // session on its own.
                    if had_script && result_on_stop.is_none() {
                        let _ = event_tx.send(RecognizerEvent::End).await;
                        return;
                    }
                    // Nothing recognized yet; idle until stopped or aborted.
                    let control = control_rx.recv().await;
                    if let Some(RecognizerControl::Stop) = control
                        && let Some(text) = result_on_stop.take()
                    {
                        let _ = event_tx
                            .send(RecognizerEvent::Result { transcript: text })
                            .await;
                    }
                    let _ = event_tx.send(RecognizerEvent::End).await;
                    return;
                };

                tokio::select! {
                    control = control_rx.recv() => {
                        if let Some(RecognizerControl::Stop) = control
                            && let Some(text) = result_on_stop.take()
                        {
                            let _ = event_tx
                                .send(RecognizerEvent::Result { transcript: text })
                                .await;
                        }
                        let _ = event_tx.send(RecognizerEvent::End).await;
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {
                        let outgoing = match event {
                            ScriptedEvent::Result(text) => {
                                RecognizerEvent::Result { transcript: text }
                            }
                            ScriptedEvent::Error(code) => RecognizerEvent::Error { code },
                        };
                        if event_tx.send(outgoing).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(RecognizerHandle {
            events: event_rx,
            control: control_tx,
        })
    }
}
