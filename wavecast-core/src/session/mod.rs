//! Per-connection session state: the audio ring buffer, transcript
//! history, VAD flags, and the owned recognizer instance a dispatcher
//! task drives.

pub mod manager;

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::AudioEncoding;
use crate::recognizer::{factory, Recognizer, RecognizerParams};

/// Metadata describing the shape of the audio a session receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: AudioEncoding,
    pub language: String,
}

impl Default for AudioMetadata {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            encoding: AudioEncoding::Float32,
            language: "vi".to_string(),
        }
    }
}

impl AudioMetadata {
    pub fn bytes_per_sample(&self) -> usize {
        crate::audio::bytes_per_sample(self.encoding)
    }
}

/// Per-session transcription tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TranscriptionConfig {
    pub engine: String,
    pub model_size: String,
    pub partial_results: bool,
    pub vad_enabled: bool,
    pub vad_threshold: f32,
    pub silence_duration: f32,
    pub buffer_overlap: f32,
    pub window_size: f32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            engine: "auto".to_string(),
            model_size: "small".to_string(),
            partial_results: true,
            vad_enabled: true,
            vad_threshold: 0.3,
            silence_duration: 0.5,
            buffer_overlap: 0.25,
            window_size: 0.5,
        }
    }
}

impl TranscriptionConfig {
    /// Clamp to `0 <= buffer_overlap < window_size`, `vad_threshold >= 0`,
    /// `silence_duration >= 0`. Out-of-range values are clamped rather
    /// than rejected, so a malformed `config` control message can never
    /// put a session into a state where `extract_window` divides by zero
    /// or loops forever.
    pub fn normalize(&mut self) {
        if self.vad_threshold < 0.0 {
            warn!(value = self.vad_threshold, "vad_threshold < 0, clamping to 0");
            self.vad_threshold = 0.0;
        }
        if self.silence_duration < 0.0 {
            warn!(value = self.silence_duration, "silence_duration < 0, clamping to 0");
            self.silence_duration = 0.0;
        }
        if self.window_size <= 0.0 {
            warn!(value = self.window_size, "window_size <= 0, clamping to default 0.5");
            self.window_size = 0.5;
        }
        if self.buffer_overlap < 0.0 || self.buffer_overlap >= self.window_size {
            warn!(
                overlap = self.buffer_overlap,
                window = self.window_size,
                "buffer_overlap out of [0, window_size), clamping"
            );
            self.buffer_overlap = (self.window_size * 0.5).max(0.0).min(self.window_size * 0.99);
        }
    }
}

/// One finalized or partial recognizer result, re-exported here for the
/// session/dispatcher boundary.
pub use crate::recognizer::TranscriptResult;

/// Statistics tracked per session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub total_audio_seconds: f64,
}

/// One logical client stream.
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: AudioMetadata,
    pub config: TranscriptionConfig,

    raw_buffer: VecDeque<u8>,
    /// Lengths of the last 1000 chunks received, for `/info` diagnostics,
    /// without duplicating the audio bytes themselves.
    recent_chunk_lengths: VecDeque<usize>,

    transcript_history: Vec<String>,
    current_partial: String,

    pub is_speaking: bool,
    pub silence_started_at: Option<Instant>,
    pub is_processing: bool,

    pub stats: SessionStats,

    recognizer: Option<Box<dyn Recognizer>>,
    buffer_capped_once: bool,
}

/// Ring buffer cap: 30s of audio at the session's configured rate, to
/// bound memory under a client that streams without ever being drained.
const MAX_BUFFERED_SECONDS: f64 = 30.0;
const MAX_RECENT_CHUNKS: usize = 1000;

impl Session {
    pub fn new(session_id: String, metadata: AudioMetadata, config: TranscriptionConfig) -> Self {
        let now = Utc::now();
        let mut config = config;
        config.normalize();

        let mut session = Self {
            session_id,
            created_at: now,
            last_activity: now,
            metadata,
            config,
            raw_buffer: VecDeque::new(),
            recent_chunk_lengths: VecDeque::new(),
            transcript_history: Vec::new(),
            current_partial: String::new(),
            is_speaking: false,
            silence_started_at: None,
            is_processing: false,
            stats: SessionStats::default(),
            recognizer: None,
            buffer_capped_once: false,
        };
        session.rebuild_recognizer();
        session
    }

    /// Destroy the current recognizer (if any) and construct a fresh one
    /// from the session's current config/metadata.
    pub fn rebuild_recognizer(&mut self) {
        self.recognizer = None;
        let params = RecognizerParams {
            sample_rate: self.metadata.sample_rate,
            language: self.metadata.language.clone(),
            partial_results: self.config.partial_results,
            model_size: self.config.model_size.clone(),
        };
        self.recognizer = factory::create(&self.config.engine, params);
    }

    pub fn recognizer_mut(&mut self) -> Option<&mut dyn Recognizer> {
        self.recognizer.as_deref_mut()
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    fn bytes_per_second(&self) -> usize {
        self.metadata.sample_rate as usize * self.metadata.bytes_per_sample()
    }

    /// Append a chunk, update activity/stats.
    pub fn add_chunk(&mut self, chunk: &[u8]) {
        self.raw_buffer.extend(chunk.iter().copied());
        self.recent_chunk_lengths.push_back(chunk.len());
        if self.recent_chunk_lengths.len() > MAX_RECENT_CHUNKS {
            self.recent_chunk_lengths.pop_front();
        }

        self.stats.packets_received += 1;
        self.stats.bytes_received += chunk.len() as u64;

        let bps = self.bytes_per_second();
        if bps > 0 {
            self.stats.total_audio_seconds += chunk.len() as f64 / bps as f64;
        }

        self.enforce_buffer_cap();
        self.touch();
    }

    fn enforce_buffer_cap(&mut self) {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return;
        }
        let max_bytes = (MAX_BUFFERED_SECONDS * bps as f64) as usize;
        if self.raw_buffer.len() > max_bytes {
            let excess = self.raw_buffer.len() - max_bytes;
            if !self.buffer_capped_once {
                warn!(
                    session_id = %self.session_id,
                    excess,
                    "raw audio buffer exceeded cap, dropping oldest bytes"
                );
                self.buffer_capped_once = true;
            }
            self.raw_buffer.drain(..excess);
        }
    }

    /// Extract exactly `⌈window_size * bytes_per_sec⌉` bytes from the
    /// buffer head, retaining `buffer_overlap` seconds as the head of the
    /// next window.
    pub fn extract_window(&mut self) -> Option<Vec<u8>> {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return None;
        }

        let bytes_needed = (self.config.window_size as f64 * bps as f64).ceil() as usize;
        if bytes_needed == 0 || self.raw_buffer.len() < bytes_needed {
            return None;
        }

        let window: Vec<u8> = self.raw_buffer.iter().take(bytes_needed).copied().collect();

        let overlap_bytes = (self.config.buffer_overlap as f64 * bps as f64) as usize;
        let advance = bytes_needed.saturating_sub(overlap_bytes);
        self.raw_buffer.drain(..advance);

        Some(window)
    }

    /// Record a partial or final transcript. Empty text is ignored for
    /// finals; partials always overwrite.
    pub fn add_transcript(&mut self, text: &str, is_partial: bool) {
        if is_partial {
            self.current_partial = text.to_string();
            return;
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.transcript_history.push(trimmed.to_string());
        self.current_partial.clear();
    }

    pub fn transcript_history(&self) -> &[String] {
        &self.transcript_history
    }

    pub fn current_transcript(&self) -> String {
        match self.transcript_history.last() {
            Some(last) if !self.current_partial.is_empty() => {
                format!("{last} {}", self.current_partial)
            }
            Some(last) => last.clone(),
            None => self.current_partial.clone(),
        }
    }

    pub fn current_partial(&self) -> &str {
        &self.current_partial
    }

    /// Clear the audio buffer; history is untouched.
    pub fn reset_buffers(&mut self) {
        self.raw_buffer.clear();
        self.buffer_capped_once = false;
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity).num_seconds()
    }

    pub fn recent_chunk_count(&self) -> usize {
        self.recent_chunk_lengths.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.raw_buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float32_metadata() -> AudioMetadata {
        AudioMetadata {
            sample_rate: 16_000,
            channels: 1,
            encoding: AudioEncoding::Float32,
            language: "en".to_string(),
        }
    }

    fn config_with(window_size: f32, buffer_overlap: f32) -> TranscriptionConfig {
        TranscriptionConfig {
            window_size,
            buffer_overlap,
            ..Default::default()
        }
    }

    #[test]
    fn extract_window_returns_none_when_insufficient() {
        let mut s = Session::new("s1".into(), float32_metadata(), config_with(0.5, 0.25));
        s.add_chunk(&vec![0u8; 1000]);
        assert!(s.extract_window().is_none());
    }

    #[test]
    fn extract_window_returns_exact_size() {
        let mut s = Session::new("s1".into(), float32_metadata(), config_with(0.5, 0.25));
        // 0.5s * 16000 * 4 bytes = 32000 bytes needed
        s.add_chunk(&vec![0u8; 32_000]);
        let window = s.extract_window().unwrap();
        assert_eq!(window.len(), 32_000);
    }

    #[test]
    fn extract_window_advances_by_window_minus_overlap() {
        let mut s = Session::new("s1".into(), float32_metadata(), config_with(0.5, 0.25));
        s.add_chunk(&vec![1u8; 64_000]); // 2 windows worth
        s.extract_window().unwrap();
        // advance = (0.5 - 0.25) * 16000 * 4 = 16000 bytes consumed
        assert_eq!(s.buffered_bytes(), 64_000 - 16_000);
    }

    #[test]
    fn overlap_correctness_for_two_one_second_chunks() {
        // window_size=0.5, overlap=0.25, sample_rate=16000, float32
        // feeding 32000 then 32000 bytes (1s total) should allow 3-4 extractions
        let mut s = Session::new("s1".into(), float32_metadata(), config_with(0.5, 0.25));
        s.add_chunk(&vec![1u8; 32_000]);
        s.add_chunk(&vec![1u8; 32_000]);
        let mut count = 0;
        while s.extract_window().is_some() {
            count += 1;
        }
        assert!((3..=4).contains(&count), "expected 3-4 extractions, got {count}");
    }

    #[test]
    fn add_transcript_partial_overwrites_without_history() {
        let mut s = Session::new("s1".into(), float32_metadata(), TranscriptionConfig::default());
        s.add_transcript("hello", true);
        assert_eq!(s.current_partial(), "hello");
        assert!(s.transcript_history().is_empty());
    }

    #[test]
    fn add_transcript_final_appends_and_clears_partial() {
        let mut s = Session::new("s1".into(), float32_metadata(), TranscriptionConfig::default());
        s.add_transcript("partial text", true);
        s.add_transcript("  final text  ", false);
        assert_eq!(s.transcript_history(), &["final text".to_string()]);
        assert_eq!(s.current_partial(), "");
    }

    #[test]
    fn add_transcript_ignores_empty_final() {
        let mut s = Session::new("s1".into(), float32_metadata(), TranscriptionConfig::default());
        s.add_transcript("   ", false);
        assert!(s.transcript_history().is_empty());
    }

    #[test]
    fn reset_buffers_clears_audio_not_history() {
        let mut s = Session::new("s1".into(), float32_metadata(), TranscriptionConfig::default());
        s.add_chunk(&vec![1u8; 100]);
        s.add_transcript("kept", false);
        s.reset_buffers();
        assert_eq!(s.buffered_bytes(), 0);
        assert_eq!(s.transcript_history(), &["kept".to_string()]);
    }

    #[test]
    fn buffer_cap_drops_oldest_bytes() {
        let mut s = Session::new("s1".into(), float32_metadata(), TranscriptionConfig::default());
        let bps = 16_000 * 4;
        let too_much = bps * 31; // 31s > 30s cap
        s.add_chunk(&vec![7u8; too_much]);
        assert!(s.buffered_bytes() <= bps * 30);
    }

    #[test]
    fn config_normalize_clamps_invalid_overlap() {
        let mut config = TranscriptionConfig {
            window_size: 0.5,
            buffer_overlap: 0.9, // invalid: >= window_size
            ..Default::default()
        };
        config.normalize();
        assert!(config.buffer_overlap < config.window_size);
    }

    #[test]
    fn config_normalize_clamps_negative_threshold() {
        let mut config = TranscriptionConfig {
            vad_threshold: -1.0,
            ..Default::default()
        };
        config.normalize();
        assert_eq!(config.vad_threshold, 0.0);
    }

    #[test]
    fn bytes_per_sample_derives_from_encoding_not_hardcoded() {
        let mut metadata = float32_metadata();
        assert_eq!(metadata.bytes_per_sample(), 4);
        metadata.encoding = AudioEncoding::Int16;
        assert_eq!(metadata.bytes_per_sample(), 2);
    }
}
