//! Speech-to-text backends: the platform recognizer abstraction and the
//! remote clip transcription client.

pub mod recognizer;
pub mod remote;

pub use recognizer::{
    MockRecognizer, RecognizerControl, RecognizerEvent, RecognizerHandle, SpeechRecognizer,
    UnsupportedRecognizer, map_error_code,
};
pub use remote::{HttpTranscriptionService, MockTranscriptionService, TranscriptionService};
