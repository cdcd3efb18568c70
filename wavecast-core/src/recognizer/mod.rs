//! Recognizer abstraction: a pluggable polymorphic interface over the
//! three speech-to-text back-ends, plus a process-wide registry and a
//! factory layer that resolves engine aliases and defaults on top of it.

pub mod chunked_buffered;
pub mod cloud_http;
pub mod factory;
pub mod registry;
pub mod streaming_fst;

pub use chunked_buffered::ChunkedBufferedRecognizer;
pub use cloud_http::CloudHttpRecognizer;
pub use streaming_fst::StreamingFstRecognizer;

use crate::error::Result;

/// A single recognition result for one `process_audio` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final: bool,
    pub confidence: Option<f32>,
}

impl TranscriptResult {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            is_final: true,
            confidence: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Contract shared by all recognizer back-ends.
///
/// Implementations are not assumed `Sync` — only the owning session's
/// dispatcher task ever calls a given instance, so `&mut self` here is
/// sufficient; no interior mutability is required at this layer.
pub trait Recognizer: Send + 'static {
    /// Process one audio chunk. Each back-end accepts int16 PCM;
    /// converting from the session's declared encoding is the
    /// recognizer's own responsibility.
    fn process_audio(&mut self, chunk: &[u8]) -> Result<TranscriptResult>;

    /// Discard internal partial state; keep any loaded model.
    fn reset(&mut self);

    /// True only once runtime prerequisites are satisfied and
    /// initialization succeeded.
    fn is_available(&self) -> bool;

    /// Stable identifier used by the registry (`"kaldi-streaming"`,
    /// `"whisper"`, `"cloud-http"`, …).
    fn engine_name(&self) -> &'static str;
}

/// Optional capability: whole-file transcription, used by the REST
/// `/transcribe` one-shot endpoint.
pub trait FileTranscribable: Recognizer {
    fn transcribe_file(&mut self, audio: &[u8]) -> Result<FileTranscription>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileTranscription {
    pub text: String,
    pub segments: Vec<String>,
    pub language: String,
}

/// Parameters passed to a recognizer constructor.
#[derive(Debug, Clone)]
pub struct RecognizerParams {
    pub sample_rate: u32,
    pub language: String,
    pub partial_results: bool,
    pub model_size: String,
}

impl Default for RecognizerParams {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            language: "vi".to_string(),
            partial_results: true,
            model_size: "small".to_string(),
        }
    }
}

/// Maps an internal language code to the cloud recognizer's locale tag.
/// Unknown codes fall back to `en-US`.
pub fn map_language_code(language: &str) -> &'static str {
    match language {
        "vi" => "vi-VN",
        "en" => "en-US",
        _ => "en-US",
    }
}
