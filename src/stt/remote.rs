//! Remote transcription service client.
//!
//! Clips are shipped to an HTTP endpoint as base64-encoded audio in a JSON
//! body (`{"audio": ..., "language": ...}`) and come back as `{"text": ...}`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{HarkenError, Result};
use crate::session::Language;

/// Trait for clip transcription backends.
///
/// This trait allows swapping implementations (real HTTP service vs mock).
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe an encoded audio clip.
    ///
    /// # Arguments
    /// * `clip` - Complete WAV-encoded audio clip
    /// * `language` - Language tag sent to the service
    ///
    /// # Returns
    /// The non-empty transcript, or an error. An empty or missing `text`
    /// field counts as a failure.
    async fn transcribe(&self, clip: &[u8], language: Language) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    audio: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for the voice-to-text endpoint.
pub struct HttpTranscriptionService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptionService {
    /// Build a client from service configuration.
    ///
    /// No request timeout is applied unless `request_timeout_ms` is set;
    /// transcription latency varies too much for a safe default.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout_ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        let client = builder
            .build()
            .map_err(|e| HarkenError::TranscriptionRequest {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn transcribe(&self, clip: &[u8], language: Language) -> Result<String> {
        let audio = STANDARD.encode(clip);
        let request = TranscribeRequest {
            audio: &audio,
            language: language.code(),
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            language = %language,
            clip_bytes = clip.len(),
            "sending clip for transcription"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| HarkenError::TranscriptionRequest {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarkenError::TranscriptionStatus {
                status: status.as_u16(),
            });
        }

        let body: TranscribeResponse =
            response
                .json()
                .await
                .map_err(|e| HarkenError::TranscriptionResponse {
                    message: e.to_string(),
                })?;

        match body.text {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(HarkenError::EmptyTranscript),
        }
    }
}

#[derive(Debug, Clone)]
enum MockFailure {
    Request(String),
    Status(u16),
    Empty,
}

/// One recorded call to a [`MockTranscriptionService`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub clip: Vec<u8>,
    pub language: Language,
}

/// Mock transcription service for testing.
#[derive(Debug, Clone)]
pub struct MockTranscriptionService {
    response: String,
    failure: Option<MockFailure>,
    delay: Duration,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Default for MockTranscriptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscriptionService {
    /// Create a mock that returns "mock transcript" for every clip.
    pub fn new() -> Self {
        Self {
            response: "mock transcript".to_string(),
            failure: None,
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a specific transcript.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail as if the request never completed.
    pub fn with_request_failure(mut self, message: &str) -> Self {
        self.failure = Some(MockFailure::Request(message.to_string()));
        self
    }

    /// Configure the mock to fail with an HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.failure = Some(MockFailure::Status(status));
        self
    }

    /// Configure the mock to return an empty transcript.
    pub fn with_empty_response(mut self) -> Self {
        self.failure = Some(MockFailure::Empty);
        self
    }

    /// Delay each call, modelling service latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls made so far (clip bytes and language, in order).
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of transcription calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, clip: &[u8], language: Language) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                clip: clip.to_vec(),
                language,
            });
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.failure {
            Some(MockFailure::Request(message)) => Err(HarkenError::TranscriptionRequest {
                message: message.clone(),
            }),
            Some(MockFailure::Status(status)) => {
                Err(HarkenError::TranscriptionStatus { status: *status })
            }
            Some(MockFailure::Empty) => Err(HarkenError::EmptyTranscript),
            None => Ok(self.response.clone()),
        }
    }
}
