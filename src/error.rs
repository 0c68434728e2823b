//! Error types for harken.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarkenError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Microphone/capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone access failed: {message}")]
    MicrophoneAccess { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Clip encoding failed: {message}")]
    ClipEncode { message: String },

    // Continuous recognizer errors
    #[error("Continuous speech recognition is not supported on this platform")]
    RecognizerUnsupported,

    #[error("Speech recognizer error: {code}")]
    Recognizer { code: String },

    // Remote transcription errors
    #[error("Transcription request failed: {message}")]
    TranscriptionRequest { message: String },

    #[error("Transcription service returned status {status}")]
    TranscriptionStatus { status: u16 },

    #[error("Malformed transcription response: {message}")]
    TranscriptionResponse { message: String },

    #[error("Transcription service returned no text")]
    EmptyTranscript,

    // Session errors
    #[error("Engine selection is not allowed while a capture session is active")]
    SessionActive,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, HarkenError>;
