//! Audio capture, level metering, and silence endpointing.

#[cfg(feature = "cpal-audio")]
pub mod cpal_mic;
pub mod level;
pub mod microphone;
pub mod vad;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use cpal_mic::{CpalMicrophone, list_devices};
pub use level::LevelFrame;
pub use microphone::{AudioChunk, LevelMeter, MicStream, Microphone, StreamSpec};
pub use vad::{Clock, EndpointDetector, SystemClock, VadConfig, VadEvent, VadState};
