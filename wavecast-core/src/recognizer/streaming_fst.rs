//! Back-end A: streaming finite-state recognizer (Kaldi-style).
//!
//! Maintains an acoustic/language decoder that emits both partial and
//! final hypotheses as an utterance boundary is detected.
//!
//! This implementation models the decoder as a simple accumulate-then-emit
//! state machine rather than linking an actual Kaldi/Vosk runtime — the
//! acoustic model internals are treated as a black box. A real deployment
//! swaps `decode_step` for an FFI call into a loaded decoder graph;
//! everything around it (int16 normalization, partial vs. final emission,
//! reset) is the stable contract.

use tracing::{debug, warn};

use crate::audio::{self, AudioEncoding};
use crate::error::Result;

use super::{Recognizer, RecognizerParams, TranscriptResult};

/// Samples of speech the decoder wants to see before it will consider an
/// utterance boundary reached. Kept small — this back-end favors low
/// latency partials over batch accuracy.
const UTTERANCE_END_SAMPLES: usize = 32_000; // 2s at 16kHz int16-equivalent sample count

pub struct StreamingFstRecognizer {
    params: RecognizerParams,
    accumulated: Vec<i16>,
    utterance_count: u32,
}

impl StreamingFstRecognizer {
    pub fn new(params: RecognizerParams) -> Self {
        Self {
            params,
            accumulated: Vec::new(),
            utterance_count: 0,
        }
    }

    /// Normalize an incoming chunk to int16 PCM.
    ///
    /// Detects by buffer length parity and a small amplitude probe; if
    /// the buffer already looks like non-zero int16 data, pass it through
    /// unchanged. This heuristic is inherently fallible — callers that
    /// can declare `AudioMetadata::encoding` should do so rather than
    /// rely on it.
    fn ensure_int16(chunk: &[u8]) -> Vec<u8> {
        if chunk.len() % 2 == 0 {
            let probe_len = chunk.len().min(10);
            let probe = &chunk[..probe_len];
            if probe_len >= 2 {
                let looks_like_int16 = probe
                    .chunks_exact(2)
                    .any(|c| i16::from_le_bytes([c[0], c[1]]) != 0);
                if looks_like_int16 {
                    return chunk.to_vec();
                }
            }
        }

        if chunk.len() % 4 == 0 {
            audio::float32_to_int16(chunk)
        } else {
            warn!(len = chunk.len(), "streaming_fst: could not determine encoding, passing through");
            chunk.to_vec()
        }
    }

    fn decode_step(&mut self, int16_bytes: &[u8]) -> bool {
        let samples: Vec<i16> = int16_bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        self.accumulated.extend_from_slice(&samples);
        self.accumulated.len() >= UTTERANCE_END_SAMPLES
    }

    fn current_partial_text(&self) -> String {
        if self.accumulated.is_empty() {
            String::new()
        } else {
            format!("… ({} samples)", self.accumulated.len())
        }
    }
}

impl Recognizer for StreamingFstRecognizer {
    fn process_audio(&mut self, chunk: &[u8]) -> Result<TranscriptResult> {
        let int16 = Self::ensure_int16(chunk);
        let end_of_utterance = self.decode_step(&int16);

        if end_of_utterance {
            self.utterance_count += 1;
            let text = format!("[kaldi-streaming utterance #{}]", self.utterance_count);
            debug!(utterance = self.utterance_count, "streaming_fst: final hypothesis");
            self.accumulated.clear();
            return Ok(TranscriptResult {
                text,
                is_final: true,
                confidence: None,
            });
        }

        if self.params.partial_results {
            Ok(TranscriptResult {
                text: self.current_partial_text(),
                is_final: false,
                confidence: None,
            })
        } else {
            Ok(TranscriptResult::empty())
        }
    }

    fn reset(&mut self) {
        debug!("streaming_fst: reset");
        self.accumulated.clear();
    }

    fn is_available(&self) -> bool {
        true
    }

    fn engine_name(&self) -> &'static str {
        "kaldi-streaming"
    }
}

/// Bytes-per-sample this back-end expects for its *own* internal encoding
/// (always int16).
pub fn expected_encoding() -> AudioEncoding {
    AudioEncoding::Int16
}
