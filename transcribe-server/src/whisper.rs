use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::Form;
use retry_policy::{Classify, FailureClass};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Clone, Debug, Default)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Seconds of audio, as reported by `verbose_json`.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// One call to a speech-to-text backend. Blocking; run it off the async
/// workers.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path, options: &TranscribeOptions) -> Result<Transcript, WhisperError>;
}

#[derive(Debug, Error)]
pub enum WhisperError {
    #[error("authentication failed (401): {0}")]
    Authentication(String),

    #[error("invalid request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("permission denied (403): {0}")]
    PermissionDenied(String),

    #[error("not found (404): {0}")]
    NotFound(String),

    #[error("rate limit exceeded (429): {0}")]
    RateLimited(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("service unavailable (503): {0}")]
    ServiceUnavailable(String),

    #[error("internal server error (500): {0}")]
    InternalServer(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("could not read audio file")]
    AudioFile(#[source] io::Error),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl WhisperError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => WhisperError::InvalidRequest { status, message },
            401 => WhisperError::Authentication(message),
            403 => WhisperError::PermissionDenied(message),
            404 => WhisperError::NotFound(message),
            408 => WhisperError::Timeout(message),
            429 => WhisperError::RateLimited(message),
            500 => WhisperError::InternalServer(message),
            503 => WhisperError::ServiceUnavailable(message),
            s if s >= 500 => WhisperError::Api { status, message },
            _ => WhisperError::InvalidRequest { status, message },
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WhisperError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            WhisperError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            WhisperError::from_status(status.as_u16(), err.to_string())
        } else {
            WhisperError::Decode(err.to_string())
        }
    }
}

impl Classify for WhisperError {
    fn failure_class(&self) -> FailureClass {
        match self {
            WhisperError::Authentication(_)
            | WhisperError::InvalidRequest { .. }
            | WhisperError::PermissionDenied(_)
            | WhisperError::NotFound(_)
            | WhisperError::AudioFile(_) => FailureClass::Permanent,
            WhisperError::RateLimited(_)
            | WhisperError::Timeout(_)
            | WhisperError::Connection(_)
            | WhisperError::ServiceUnavailable(_)
            | WhisperError::InternalServer(_)
            | WhisperError::Api { .. } => FailureClass::Transient,
            WhisperError::Decode(_) => FailureClass::Unknown,
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Pulls `error.message` out of an OpenAI-style error body.
fn api_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.chars().take(500).collect(),
    }
}

/// Client for the hosted Whisper transcription endpoint.
pub struct WhisperClient {
    http: reqwest::blocking::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl WhisperClient {
    pub fn new(base_url: &Url, api_key: String, model: String, timeout: Duration) -> Result<Self, WhisperError> {
        let endpoint = transcription_endpoint(base_url)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(WhisperError::from_transport)?;
        tracing::info!("Whisper client targeting {} with model {}", endpoint, model);
        Ok(Self { http, endpoint, api_key, model })
    }
}

fn transcription_endpoint(base_url: &Url) -> Result<Url, WhisperError> {
    let joined = format!("{}/audio/transcriptions", base_url.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| WhisperError::Decode(format!("bad endpoint {}: {}", joined, e)))
}

impl Transcriber for WhisperClient {
    fn transcribe(&self, audio: &Path, options: &TranscribeOptions) -> Result<Transcript, WhisperError> {
        tracing::info!("Starting transcription for file: {}", audio.display());

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0")
            .file("file", audio)
            .map_err(WhisperError::AudioFile)?;
        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(WhisperError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(WhisperError::from_status(status.as_u16(), api_message(&body)));
        }

        let transcript: Transcript = response
            .json()
            .map_err(|e| WhisperError::Decode(e.to_string()))?;
        tracing::info!(
            "Successfully transcribed file: {} ({} characters)",
            audio.display(),
            transcript.text.chars().count()
        );
        Ok(transcript)
    }
}
