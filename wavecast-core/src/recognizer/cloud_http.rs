//! Back-end C: cloud HTTP recognizer.
//!
//! Wraps a single chunk in a request envelope and calls a cloud
//! recognition endpoint over HTTP. Network failures are logged and
//! swallowed to an empty result rather than propagated — a flaky cloud
//! endpoint should degrade a session's transcripts, not tear it down.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::audio;
use crate::error::Result;

use super::{map_language_code, Recognizer, RecognizerParams, TranscriptResult};

/// Default bounded timeout for cloud recognizer calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    audio_base64: String,
    sample_rate: u32,
    sample_width: u8,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    text: String,
}

pub struct CloudHttpRecognizer {
    params: RecognizerParams,
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl CloudHttpRecognizer {
    pub fn new(params: RecognizerParams) -> Self {
        Self::with_endpoint(params, default_endpoint())
    }

    pub fn with_endpoint(params: RecognizerParams, endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            params,
            client,
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn recognize(&self, int16_bytes: &[u8]) -> Result<TranscriptResult> {
        let request = RecognizeRequest {
            audio_base64: BASE64.encode(int16_bytes),
            sample_rate: self.params.sample_rate,
            sample_width: 2,
            language: map_language_code(&self.params.language),
        };

        let call = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send();

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(endpoint = %self.endpoint, "cloud recognizer call timed out");
                Ok(TranscriptResult::empty())
            }
            Ok(Err(e)) => {
                error!(error = %e, "cloud recognizer network failure");
                Ok(TranscriptResult::empty())
            }
            Ok(Ok(response)) => {
                if !response.status().is_success() {
                    warn!(status = %response.status(), "cloud recognizer non-success response");
                    return Ok(TranscriptResult::empty());
                }
                match response.json::<RecognizeResponse>().await {
                    Ok(body) if !body.text.trim().is_empty() => Ok(TranscriptResult {
                        text: body.text,
                        is_final: true,
                        confidence: Some(1.0),
                    }),
                    Ok(_) => Ok(TranscriptResult::empty()),
                    Err(e) => {
                        error!(error = %e, "cloud recognizer response decode failure");
                        Ok(TranscriptResult::empty())
                    }
                }
            }
        }
    }
}

fn default_endpoint() -> String {
    std::env::var("WAVECAST_CLOUD_ENDPOINT")
        .unwrap_or_else(|_| "https://cloud-recognizer.invalid/v1/recognize".to_string())
}

impl Recognizer for CloudHttpRecognizer {
    fn process_audio(&mut self, chunk: &[u8]) -> Result<TranscriptResult> {
        let int16 = if chunk.len() % 4 == 0 {
            audio::float32_to_int16(chunk)
        } else {
            chunk.to_vec()
        };

        // `process_audio` is defined synchronously by the trait but the
        // cloud call is inherently async; block on the current Tokio
        // runtime handle. The dispatcher that owns this recognizer always
        // runs inside a Tokio task, so a handle is guaranteed to exist.
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.recognize(&int16))
        })
    }

    fn reset(&mut self) {
        // Stateless per-chunk recognizer — nothing to discard.
    }

    fn is_available(&self) -> bool {
        true
    }

    fn engine_name(&self) -> &'static str {
        "cloud-http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_failure_returns_empty_not_error() {
        let recognizer = CloudHttpRecognizer::with_endpoint(
            RecognizerParams::default(),
            "http://127.0.0.1:1/unreachable".to_string(),
        );
        let result = recognizer.recognize(&[0u8; 10]).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn engine_name_is_cloud_http() {
        let r = CloudHttpRecognizer::new(RecognizerParams::default());
        assert_eq!(r.engine_name(), "cloud-http");
    }
}
