use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::HarkenError;
use crate::session::Language;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub service: ServiceConfig,
    pub audio: AudioConfig,
}

/// Capture and endpointing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub language: Language,
    pub silence_threshold_db: f32,
    pub silence_duration_ms: u64,
}

/// Remote transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    /// Optional hard timeout on the transcription request. The default (no
    /// timeout) matches the service contract; a stalled call surfaces only
    /// through the transport's own failure.
    pub request_timeout_ms: Option<u64>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            silence_duration_ms: defaults::SILENCE_DURATION_MS,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            request_timeout_ms: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    // Re-panic on invalid TOML or other errors
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - HARKEN_LANGUAGE → capture.language (must be a supported code)
    /// - HARKEN_ENDPOINT → service.endpoint
    /// - HARKEN_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(code) = std::env::var("HARKEN_LANGUAGE")
            && !code.is_empty()
        {
            match Language::from_code(&code) {
                Some(language) => self.capture.language = language,
                None => tracing::warn!(code, "ignoring unsupported HARKEN_LANGUAGE"),
            }
        }

        if let Ok(endpoint) = std::env::var("HARKEN_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.service.endpoint = endpoint;
        }

        if let Ok(device) = std::env::var("HARKEN_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Check that the configured values are usable.
    ///
    /// The silence threshold must sit between the dB floor and 0, the
    /// silence duration must be positive, and the endpoint must be set.
    pub fn validate(&self) -> crate::Result<()> {
        let threshold = self.capture.silence_threshold_db;
        if !(defaults::DB_FLOOR..=0.0).contains(&threshold) {
            return Err(HarkenError::ConfigInvalidValue {
                key: "capture.silence_threshold_db".to_string(),
                message: format!(
                    "must be between {} and 0, got {}",
                    defaults::DB_FLOOR,
                    threshold
                ),
            });
        }

        if self.capture.silence_duration_ms == 0 {
            return Err(HarkenError::ConfigInvalidValue {
                key: "capture.silence_duration_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.service.endpoint.is_empty() {
            return Err(HarkenError::ConfigInvalidValue {
                key: "service.endpoint".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/harken/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("harken")
            .join("config.toml")
    }
}
