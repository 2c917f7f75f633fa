//! Transcription backend interface and the HTTP bridge client.
//!
//! The backend accepts either backend-owned capture (`start_capture` /
//! `stop_capture`) or a directly supplied base64 WAV payload
//! (`transcribe`). [`BackendCapture`] adapts the former to the
//! [`CaptureEngine`] interface so the session controller is agnostic to
//! where audio is captured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audio::{CaptureEngine, EncodedClip, StopOutcome};
use crate::error::{Error, Result};

/// Transcription result forwarded to the transcript sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub duration_secs: f64,
}

#[async_trait]
pub trait TranscriptionBackend: Send + Sync + 'static {
    /// Begin a backend-owned capture.
    async fn start_capture(&self, device: Option<&str>) -> Result<()>;

    /// Stop a backend-owned capture and return the transcript.
    async fn stop_capture(&self) -> Result<Transcript>;

    /// Transcribe a locally captured clip supplied as base64 WAV.
    async fn transcribe(&self, clip: &EncodedClip) -> Result<Transcript>;

    /// Propagate the transcription settings group.
    async fn configure(&self, model: &str, language: &str, auto_paste: bool) -> Result<()>;
}

/// HTTP client for a dictation bridge server.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<BridgeResponse> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(url.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::BackendFailure(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::BackendFailure(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let envelope: BridgeResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendFailure(format!("invalid response from {url}: {e}")))?;
        envelope.into_result()
    }
}

#[async_trait]
impl TranscriptionBackend for HttpBackend {
    async fn start_capture(&self, device: Option<&str>) -> Result<()> {
        self.post("capture/start", &serde_json::json!({ "device": device }))
            .await?;
        Ok(())
    }

    async fn stop_capture(&self) -> Result<Transcript> {
        let response = self.post("capture/stop", &serde_json::json!({})).await?;
        response.into_transcript()
    }

    async fn transcribe(&self, clip: &EncodedClip) -> Result<Transcript> {
        let response = self
            .post("transcribe", &serde_json::json!({ "audio": clip.base64 }))
            .await?;
        let mut transcript = response.into_transcript()?;
        // The bridge may not echo a duration for supplied payloads
        if transcript.duration_secs == 0.0 {
            transcript.duration_secs = clip.duration_secs;
        }
        Ok(transcript)
    }

    async fn configure(&self, model: &str, language: &str, auto_paste: bool) -> Result<()> {
        let body = serde_json::json!({
            "model": model,
            "language": language,
            "autoPaste": auto_paste,
        });
        self.post("configure", &body).await?;
        Ok(())
    }
}

/// Response envelope spoken by the bridge.
#[derive(Debug, Deserialize, Serialize)]
struct BridgeResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl BridgeResponse {
    fn into_result(self) -> Result<BridgeResponse> {
        if self.kind == "error" {
            let message = self.message.unwrap_or_else(|| "unknown error".into());
            return Err(match self.code.as_deref() {
                Some("MIC_PERMISSION_DENIED") => Error::PermissionDenied,
                Some("ALREADY_RECORDING") => Error::AlreadyCapturing,
                Some("NOT_RECORDING") => Error::NotCapturing,
                _ => Error::BackendFailure(message),
            });
        }
        Ok(self)
    }

    fn into_transcript(self) -> Result<Transcript> {
        match self.text {
            Some(text) => Ok(Transcript {
                text,
                duration_secs: self.duration.unwrap_or(0.0),
            }),
            None => Err(Error::BackendFailure(format!(
                "expected a transcription response, got '{}'",
                self.kind
            ))),
        }
    }
}

fn validate_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::BackendFailure(
            "transcription backend URL not configured".into(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(Error::BackendFailure(format!(
            "invalid backend URL '{trimmed}': must start with http:// or https://"
        )));
    }
    let after_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or("");
    if after_scheme.is_empty() || after_scheme.starts_with('/') {
        return Err(Error::BackendFailure(format!(
            "invalid backend URL '{trimmed}': missing host"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// [`CaptureEngine`] adapter for backend-owned capture.
pub struct BackendCapture<B: TranscriptionBackend> {
    backend: Arc<B>,
}

impl<B: TranscriptionBackend> BackendCapture<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: TranscriptionBackend> CaptureEngine for BackendCapture<B> {
    async fn start(&self, device: Option<String>) -> Result<()> {
        self.backend.start_capture(device.as_deref()).await
    }

    async fn stop(&self) -> Result<StopOutcome> {
        let transcript = self.backend.stop_capture().await?;
        Ok(StopOutcome::Transcript(transcript))
    }

    async fn cancel(&self) -> Result<()> {
        // Backend capture has no discard operation; stop and drop the result
        let _ = self.backend.stop_capture().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_must_have_scheme_and_host() {
        assert!(validate_base_url("http://localhost:8765").is_ok());
        assert!(validate_base_url("https://bridge.example.com/").is_ok());
        assert!(validate_base_url("localhost:8765").is_err());
        assert!(validate_base_url("http://").is_err());
        assert!(validate_base_url("").is_err());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(
            validate_base_url("http://localhost:8765/").unwrap(),
            "http://localhost:8765"
        );
    }

    #[test]
    fn error_envelope_maps_permission_code() {
        let envelope: BridgeResponse = serde_json::from_str(
            r#"{"type":"error","message":"Microphone access denied","code":"MIC_PERMISSION_DENIED"}"#,
        )
        .unwrap();
        assert!(matches!(envelope.into_result(), Err(Error::PermissionDenied)));
    }

    #[test]
    fn transcription_envelope_yields_transcript() {
        let envelope: BridgeResponse = serde_json::from_str(
            r#"{"type":"transcription","text":"hello world","duration":1.5}"#,
        )
        .unwrap();
        let transcript = envelope.into_result().unwrap().into_transcript().unwrap();
        assert_eq!(transcript.text, "hello world");
        assert!((transcript.duration_secs - 1.5).abs() < 1e-9);
    }

    #[test]
    fn ack_without_text_is_not_a_transcript() {
        let envelope: BridgeResponse =
            serde_json::from_str(r#"{"type":"ack"}"#).unwrap();
        assert!(envelope.into_transcript().is_err());
    }
}
