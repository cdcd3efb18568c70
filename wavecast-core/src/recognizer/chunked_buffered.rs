//! Back-end B: chunked buffered recognizer (Whisper-style).
//!
//! Accumulates float32 samples and triggers a full transcription once a
//! buffering threshold is crossed: `buffer_duration >= 1.0s`, or
//! `buffer_duration > 0.2s` combined with 3s of elapsed silence so short
//! utterances don't stall indefinitely.

use std::time::Instant;

use tracing::{debug, info};

use crate::audio;
use crate::error::Result;

use super::{FileTranscribable, FileTranscription, Recognizer, RecognizerParams, TranscriptResult};

/// Minimum buffered duration (seconds) that triggers transcription outright.
const TRIGGER_SECONDS: f64 = 1.0;
/// Minimum buffered duration that, combined with `STALE_SECONDS` elapsed,
/// still triggers a transcription (keeps short utterances from stalling).
const MIN_STALE_TRIGGER_SECONDS: f64 = 0.2;
/// Elapsed time since the last emission that forces a transcription even
/// when the buffer is below `TRIGGER_SECONDS`.
const STALE_SECONDS: f64 = 3.0;

pub struct ChunkedBufferedRecognizer {
    params: RecognizerParams,
    buffer: Vec<f32>,
    last_emission: Instant,
}

impl ChunkedBufferedRecognizer {
    pub fn new(params: RecognizerParams) -> Self {
        Self {
            params,
            buffer: Vec::new(),
            last_emission: Instant::now(),
        }
    }

    fn buffer_duration_secs(&self) -> f64 {
        self.buffer.len() as f64 / self.params.sample_rate as f64
    }

    fn should_trigger(&self) -> bool {
        let duration = self.buffer_duration_secs();
        duration >= TRIGGER_SECONDS
            || (duration > MIN_STALE_TRIGGER_SECONDS
                && self.last_emission.elapsed().as_secs_f64() > STALE_SECONDS)
    }

    /// Normalize amplitude to `[-1.0, 1.0]` by dividing by the peak sample
    /// magnitude. No-op on silence (peak == 0).
    fn normalize(samples: &mut [f32]) {
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak > 1.0 {
            for s in samples.iter_mut() {
                *s /= peak;
            }
        }
    }

    /// Precision used for the model call: float16 when available, float32
    /// otherwise. This stub always reports float32 since there is no real
    /// accelerator binding here; the field exists so a real ONNX/CTranslate2
    /// backend can branch on it without changing the trait contract.
    fn compute_precision(&self) -> &'static str {
        "float32"
    }

    fn run_model(&self, samples: &[f32]) -> String {
        // Placeholder acoustic model call — model internals are treated as
        // a black box here. A real backend replaces this with a call into
        // the loaded Whisper-family model using `self.params.language` and
        // `self.compute_precision()`.
        let _ = self.compute_precision();
        if samples.is_empty() {
            String::new()
        } else {
            format!(
                "[whisper:{} {} samples @ {} Hz]",
                self.params.model_size,
                samples.len(),
                self.params.sample_rate
            )
        }
    }
}

impl Recognizer for ChunkedBufferedRecognizer {
    fn process_audio(&mut self, chunk: &[u8]) -> Result<TranscriptResult> {
        let Some(samples) = audio::as_float32_samples(chunk) else {
            return Ok(TranscriptResult::empty());
        };
        self.buffer.extend_from_slice(&samples);

        if !self.should_trigger() {
            return Ok(TranscriptResult::empty());
        }

        let mut audio_buf = std::mem::take(&mut self.buffer);
        Self::normalize(&mut audio_buf);
        let text = self.run_model(&audio_buf);
        self.last_emission = Instant::now();

        if text.is_empty() {
            return Ok(TranscriptResult::empty());
        }

        info!(len = audio_buf.len(), "chunked_buffered: emitted final transcript");
        Ok(TranscriptResult {
            text,
            is_final: true,
            confidence: None,
        })
    }

    fn reset(&mut self) {
        debug!("chunked_buffered: reset");
        self.buffer.clear();
        self.last_emission = Instant::now();
    }

    fn is_available(&self) -> bool {
        true
    }

    fn engine_name(&self) -> &'static str {
        "whisper"
    }
}

impl FileTranscribable for ChunkedBufferedRecognizer {
    fn transcribe_file(&mut self, audio_bytes: &[u8]) -> Result<FileTranscription> {
        let samples = audio::as_float32_samples(audio_bytes).unwrap_or_default();
        let text = self.run_model(&samples);
        Ok(FileTranscription {
            text: text.clone(),
            segments: if text.is_empty() { vec![] } else { vec![text] },
            language: self.params.language.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(n: usize, value: f32) -> Vec<u8> {
        vec![value; n].iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn no_emission_below_threshold() {
        let mut r = ChunkedBufferedRecognizer::new(RecognizerParams {
            sample_rate: 16_000,
            ..Default::default()
        });
        let chunk = f32_bytes(1_000, 0.1); // far under 1s
        let result = r.process_audio(&chunk).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn emits_after_one_second_accumulated() {
        let mut r = ChunkedBufferedRecognizer::new(RecognizerParams {
            sample_rate: 16_000,
            ..Default::default()
        });
        let chunk = f32_bytes(16_000, 0.1); // exactly 1s
        let result = r.process_audio(&chunk).unwrap();
        assert!(result.is_final);
        assert!(!result.is_empty());
    }

    #[test]
    fn buffer_cleared_after_emission() {
        let mut r = ChunkedBufferedRecognizer::new(RecognizerParams {
            sample_rate: 16_000,
            ..Default::default()
        });
        r.process_audio(&f32_bytes(16_000, 0.1)).unwrap();
        assert!(r.buffer.is_empty());
    }

    #[test]
    fn normalize_scales_down_peak_over_one() {
        let mut samples = vec![2.0f32, -2.0, 1.0];
        ChunkedBufferedRecognizer::normalize(&mut samples);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[1], -1.0);
    }

    #[test]
    fn normalize_is_noop_within_range() {
        let mut samples = vec![0.5f32, -0.5];
        ChunkedBufferedRecognizer::normalize(&mut samples);
        assert_eq!(samples, vec![0.5, -0.5]);
    }

    #[test]
    fn transcribe_file_returns_nonempty_segments() {
        let mut r = ChunkedBufferedRecognizer::new(RecognizerParams::default());
        let chunk = f32_bytes(1_000, 0.2);
        let result = r.transcribe_file(&chunk).unwrap();
        assert!(!result.segments.is_empty());
    }

    #[test]
    fn malformed_chunk_yields_empty_result() {
        let mut r = ChunkedBufferedRecognizer::new(RecognizerParams::default());
        let result = r.process_audio(&[0u8, 1, 2]).unwrap();
        assert!(result.is_empty());
    }
}
