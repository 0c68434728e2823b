//! Microphone adapter traits.
//!
//! The capture engine never talks to audio hardware directly; it opens a
//! stream through the [`Microphone`] trait and consumes buffered PCM chunks
//! plus a live level meter. Implementations: [`MockMicrophone`] here and the
//! cpal-backed adapter in `cpal_mic` (feature `cpal-audio`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::level::LevelFrame;
use crate::defaults;
use crate::error::{HarkenError, Result};

/// Requested capture format and processing hints.
///
/// Adapters apply what the platform offers; hints that the device cannot
/// honor are ignored rather than failing the open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Specific input device name, or `None` for the platform default.
    pub device: Option<String>,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            echo_cancellation: true,
            noise_suppression: true,
            device: None,
        }
    }
}

/// One buffered slice of the live stream, roughly
/// [`defaults::CHUNK_INTERVAL_MS`] worth of mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
}

impl AudioChunk {
    /// Creates a new chunk.
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Duration of this chunk at the given sample rate.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / sample_rate as f64)
    }
}

/// Live probe of the stream's current audio level.
///
/// Sampled by the endpointing loop on a fixed cadence; must be cheap and
/// callable while chunks are being delivered.
pub trait LevelMeter: Send + Sync {
    fn sample(&self) -> LevelFrame;
}

/// An open microphone stream.
#[async_trait]
pub trait MicStream: Send {
    /// The next buffered chunk. Returns `None` once the stream has closed.
    ///
    /// Cancel safe: a poll abandoned by `select!` forfeits no audio, and
    /// chunks stay on their cadence.
    async fn next_chunk(&mut self) -> Option<AudioChunk>;

    /// Captured samples not yet delivered as chunks.
    ///
    /// Drained at stop so the tail of the recording reaches the clip
    /// before the device is released.
    fn drain(&mut self) -> Vec<i16>;

    /// Level probe for endpoint detection.
    fn meter(&self) -> Arc<dyn LevelMeter>;

    /// Release the capture device. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Microphone capability. Opening is asynchronous and may be denied.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self, spec: &StreamSpec) -> Result<Box<dyn MicStream>>;
}

/// Level meter that replays a scripted frame sequence.
///
/// Once the script is exhausted it keeps returning the final frame, so a
/// trailing quiet frame models open-ended silence.
pub struct ScriptedMeter {
    frames: Mutex<VecDeque<LevelFrame>>,
    last: Mutex<LevelFrame>,
}

impl ScriptedMeter {
    pub fn new(frames: Vec<LevelFrame>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(LevelFrame::silent()),
        }
    }
}

impl LevelMeter for ScriptedMeter {
    fn sample(&self) -> LevelFrame {
        let mut frames = self.frames.lock().unwrap();
        match frames.pop_front() {
            Some(frame) => {
                *self.last.lock().unwrap() = frame.clone();
                frame
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MockMicState {
    opens: AtomicU32,
    closes: AtomicU32,
}

/// Mock microphone for testing.
///
/// Chunks and level frames are scripted; each `open` hands out a fresh
/// stream replaying the full script. Chunk delivery is paced at the real
/// chunk cadence, so tests on a paused runtime stay deterministic.
#[derive(Clone)]
pub struct MockMicrophone {
    chunks: Vec<AudioChunk>,
    levels: Vec<LevelFrame>,
    should_fail_open: bool,
    error_message: String,
    state: Arc<MockMicState>,
}

impl MockMicrophone {
    /// Create a new mock microphone with an empty script.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            levels: Vec::new(),
            should_fail_open: false,
            error_message: "mock microphone error".to_string(),
            state: Arc::new(MockMicState::default()),
        }
    }

    /// Configure the chunks each opened stream will deliver.
    pub fn with_chunks(mut self, chunks: Vec<AudioChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Configure the level frames the stream's meter will replay.
    pub fn with_levels(mut self, levels: Vec<LevelFrame>) -> Self {
        self.levels = levels;
        self
    }

    /// Configure the mock to fail on open.
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// How many streams have been opened.
    pub fn open_count(&self) -> u32 {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// How many streams have been closed.
    pub fn close_count(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// A frame comfortably above the default silence threshold (≈ -6 dB).
    pub fn speech_frame() -> LevelFrame {
        LevelFrame::new(vec![128; defaults::LEVEL_BINS])
    }

    /// A fully silent frame.
    pub fn quiet_frame() -> LevelFrame {
        LevelFrame::silent()
    }
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Microphone for MockMicrophone {
    async fn open(&self, _spec: &StreamSpec) -> Result<Box<dyn MicStream>> {
        if self.should_fail_open {
            return Err(HarkenError::MicrophoneAccess {
                message: self.error_message.clone(),
            });
        }

        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let feeder = tokio::spawn(feed_chunks(self.chunks.clone().into(), chunk_tx));
        Ok(Box::new(MockMicStream {
            chunks: chunk_rx,
            feeder,
            meter: Arc::new(ScriptedMeter::new(self.levels.clone())),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

/// Delivery task behind [`MockMicStream`]: one chunk per cadence tick, the
/// scripted ones first, then silence, like a device that keeps capturing.
/// Exits when the stream drops its receiver.
async fn feed_chunks(mut script: VecDeque<AudioChunk>, tx: mpsc::UnboundedSender<AudioChunk>) {
    let period = Duration::from_millis(defaults::CHUNK_INTERVAL_MS);
    let mut cadence = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        cadence.tick().await;
        let chunk = script.pop_front().unwrap_or_else(|| {
            AudioChunk::new(vec![
                0i16;
                (defaults::SAMPLE_RATE as u64 * defaults::CHUNK_INTERVAL_MS
                    / 1000) as usize
            ])
        });
        if tx.send(chunk).is_err() {
            break;
        }
    }
}

/// Stream handed out by [`MockMicrophone`].
pub struct MockMicStream {
    chunks: mpsc::UnboundedReceiver<AudioChunk>,
    feeder: JoinHandle<()>,
    meter: Arc<ScriptedMeter>,
    state: Arc<MockMicState>,
    closed: bool,
}

#[async_trait]
impl MicStream for MockMicStream {
    async fn next_chunk(&mut self) -> Option<AudioChunk> {
        if self.closed {
            return None;
        }

        // recv is cancel safe: a chunk that loses a select race stays
        // queued for the next call.
        self.chunks.recv().await
    }

    fn drain(&mut self) -> Vec<i16> {
        let mut tail = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            tail.extend_from_slice(&chunk.samples);
        }
        tail
    }

    fn meter(&self) -> Arc<dyn LevelMeter> {
        Arc::clone(&self.meter) as Arc<dyn LevelMeter>
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.feeder.abort();
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
