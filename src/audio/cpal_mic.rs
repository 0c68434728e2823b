//! Real microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Implements the [`Microphone`] adapter on top of cpal: buffered PCM chunks
//! for the clip recorder plus a rolling-window level meter for endpointing.
//! Echo cancellation and noise suppression hints are left to the platform
//! audio service (PipeWire applies its own processing chain).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::time::MissedTickBehavior;

use crate::audio::level::LevelFrame;
use crate::audio::microphone::{AudioChunk, LevelMeter, MicStream, Microphone, StreamSpec};
use crate::audio::wav;
use crate::defaults;
use crate::error::{HarkenError, Result};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Drop unusable device names and mark preferred ones.
fn mark_devices(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !should_filter_device(name))
        .map(|name| {
            if is_preferred_device(&name) {
                format!("{} [recommended]", name)
            } else {
                name
            }
        })
        .collect()
}

/// List all available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]". Obviously unusable
/// devices (surround channels, HDMI, etc.) are filtered out. Names returned
/// here (without the marker) are valid values for the `[audio] device`
/// config key and the `HARKEN_AUDIO_DEVICE` override.
pub fn list_devices() -> Result<Vec<String>> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| HarkenError::MicrophoneAccess {
                message: format!("Failed to enumerate input devices: {}", e),
            })?;

        Ok(mark_devices(
            devices.filter_map(|device| device.name().ok()),
        ))
    })
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This ensures we respect the desktop's audio device selection.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| HarkenError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Find an input device by exact name, or the best default when `None`.
fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        if let Some(name) = device_name {
            let host = cpal::default_host();
            let devices = host
                .input_devices()
                .map_err(|e| HarkenError::MicrophoneAccess {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;

            for device in devices {
                if let Ok(dev_name) = device.name()
                    && dev_name == name
                {
                    return Ok(device);
                }
            }

            Err(HarkenError::AudioDeviceNotFound {
                device: name.to_string(),
            })
        } else {
            get_best_default_device()
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is owned by a single `CpalMicStream`, which hands out
/// only `&mut self` access, so stream methods are never called from two
/// threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Rolling window length for the level meter, 100ms at the target rate.
const METER_WINDOW: usize =
    (defaults::SAMPLE_RATE as u64 * defaults::LEVEL_POLL_INTERVAL_MS / 1000) as usize;

#[derive(Default)]
struct CaptureBuffers {
    /// Samples captured since the last chunk drain.
    pending: Vec<i16>,
    /// Most recent samples, kept for level metering.
    recent: VecDeque<i16>,
}

/// State shared between the cpal callback, the stream, and the meter.
struct CaptureShared {
    buffers: Mutex<CaptureBuffers>,
    callback_count: AtomicU64,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            buffers: Mutex::new(CaptureBuffers::default()),
            callback_count: AtomicU64::new(0),
        }
    }

    fn push(&self, samples: &[i16]) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.pending.extend_from_slice(samples);
            buffers.recent.extend(samples.iter().copied());
            while buffers.recent.len() > METER_WINDOW {
                buffers.recent.pop_front();
            }
        }
    }

    fn drain_pending(&self) -> Vec<i16> {
        match self.buffers.lock() {
            Ok(mut buffers) => std::mem::take(&mut buffers.pending),
            Err(_) => Vec::new(),
        }
    }

    fn clear(&self) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.pending.clear();
            buffers.recent.clear();
        }
    }
}

struct CpalMeter {
    shared: Arc<CaptureShared>,
}

impl LevelMeter for CpalMeter {
    fn sample(&self) -> LevelFrame {
        let window: Vec<i16> = match self.shared.buffers.lock() {
            Ok(buffers) => buffers.recent.iter().copied().collect(),
            Err(_) => Vec::new(),
        };
        LevelFrame::from_samples(&window)
    }
}

/// Real microphone backed by CPAL.
///
/// Captures 16-bit PCM at 16kHz mono. Tries the preferred format first
/// (i16/16kHz/mono), then f32, then falls back to the device's native config
/// with software conversion (channel mixing + resampling).
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Create a microphone factory.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best
    ///   default input device (preferring PipeWire/PulseAudio).
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, spec: &StreamSpec) -> Result<Box<dyn MicStream>> {
        let device_name = spec.device.clone().or_else(|| self.device_name.clone());
        let target_rate = spec.sample_rate;

        // Device probing and the callback liveness check block; keep them
        // off the async runtime.
        let opened = tokio::task::spawn_blocking(move || -> Result<OpenedStream> {
            let device = find_device(device_name.as_deref())?;
            let shared = Arc::new(CaptureShared::new());

            let stream = build_stream(&device, &shared, target_rate)?;
            stream.play().map_err(|e| HarkenError::MicrophoneAccess {
                message: format!("Failed to start audio stream: {}", e),
            })?;

            // Wait briefly to check if the CPAL callback actually fires.
            // Some PipeWire-ALSA setups accept non-native configs but never
            // deliver data.
            std::thread::sleep(Duration::from_millis(200));

            let stream = if shared.callback_count.load(Ordering::Relaxed) == 0 {
                drop(stream);
                shared.clear();

                let native = build_stream_native(&device, &shared, target_rate)?;
                native.play().map_err(|e| HarkenError::MicrophoneAccess {
                    message: format!("Failed to start native audio stream: {}", e),
                })?;
                native
            } else {
                stream
            };

            Ok(OpenedStream {
                stream: SendableStream(stream),
                shared,
            })
        })
        .await
        .map_err(|e| HarkenError::Other(format!("Capture init task failed: {}", e)))??;

        let meter = Arc::new(CpalMeter {
            shared: Arc::clone(&opened.shared),
        });

        let period = Duration::from_millis(defaults::CHUNK_INTERVAL_MS);
        let mut cadence = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(CpalMicStream {
            stream: Some(opened.stream),
            shared: opened.shared,
            meter,
            cadence,
        }))
    }
}

struct OpenedStream {
    stream: SendableStream,
    shared: Arc<CaptureShared>,
}

/// Open microphone stream handed out by [`CpalMicrophone`].
pub struct CpalMicStream {
    stream: Option<SendableStream>,
    shared: Arc<CaptureShared>,
    meter: Arc<CpalMeter>,
    cadence: tokio::time::Interval,
}

#[async_trait]
impl MicStream for CpalMicStream {
    async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.stream.as_ref()?;

        // The interval keeps its deadline across a cancelled poll, so a
        // chunk that loses a select race is delivered on the next call
        // rather than a full period later.
        self.cadence.tick().await;
        Some(AudioChunk::new(self.shared.drain_pending()))
    }

    fn drain(&mut self) -> Vec<i16> {
        self.shared.drain_pending()
    }

    fn meter(&self) -> Arc<dyn LevelMeter> {
        Arc::clone(&self.meter) as Arc<dyn LevelMeter>
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the cpal stream releases the device.
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.shared.clear();
        Ok(())
    }
}

/// Build the audio stream with the configured format.
///
/// Tries in order:
/// 1. i16/16kHz/mono — preferred, zero-copy path
/// 2. f32/16kHz/mono — for devices that only expose float formats
/// 3. Device default config — native rate/channels with software conversion
fn build_stream(
    device: &cpal::Device,
    shared: &Arc<CaptureShared>,
    target_rate: u32,
) -> Result<cpal::Stream> {
    let preferred_config = cpal::StreamConfig {
        channels: defaults::CHANNELS,
        sample_rate: cpal::SampleRate(target_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_callback = |err| {
        tracing::warn!("audio stream error: {}", err);
    };

    // Try i16/16kHz/mono — works with PipeWire/PulseAudio which convert transparently
    let sink = Arc::clone(shared);
    if let Ok(stream) = device.build_input_stream(
        &preferred_config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            sink.push(data);
        },
        err_callback,
        None,
    ) {
        return Ok(stream);
    }

    // Try f32/16kHz/mono — for devices that only expose float formats
    let sink = Arc::clone(shared);
    if let Ok(stream) = device.build_input_stream(
        &preferred_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let converted: Vec<i16> = data
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            sink.push(&converted);
        },
        err_callback,
        None,
    ) {
        return Ok(stream);
    }

    build_stream_native(device, shared, target_rate)
}

/// Build a stream using the device's default/native config, with software
/// channel mixing and resampling down to the target rate.
fn build_stream_native(
    device: &cpal::Device,
    shared: &Arc<CaptureShared>,
    target_rate: u32,
) -> Result<cpal::Stream> {
    use cpal::SampleFormat;

    let default_config =
        device
            .default_input_config()
            .map_err(|e| HarkenError::MicrophoneAccess {
                message: format!("Failed to query default input config: {}", e),
            })?;

    let native_rate = default_config.sample_rate().0;
    let native_channels = default_config.channels() as usize;
    let stream_config: cpal::StreamConfig = default_config.clone().into();

    tracing::info!(
        "using native audio format ({}ch/{}Hz/{:?}), converting in software",
        native_channels,
        native_rate,
        default_config.sample_format(),
    );

    let err_callback = |err| {
        tracing::warn!("audio stream error: {}", err);
    };

    match default_config.sample_format() {
        SampleFormat::I16 => {
            let sink = Arc::clone(shared);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let converted =
                            convert_to_target(data, native_channels, native_rate, target_rate);
                        sink.push(&converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| HarkenError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                })
        }
        SampleFormat::F32 => {
            let sink = Arc::clone(shared);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let converted =
                            convert_to_target(&i16_data, native_channels, native_rate, target_rate);
                        sink.push(&converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| HarkenError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                })
        }
        fmt => Err(HarkenError::AudioCapture {
            message: format!(
                "Unsupported native sample format: {:?}. \
                 Try configuring a specific input device.",
                fmt
            ),
        }),
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn convert_to_target(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    let mono: Vec<i16> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if source_rate == target_rate {
        mono
    } else {
        wav::resample(&mono, source_rate, target_rate)
    }
}
