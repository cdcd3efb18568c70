//! PCM audio primitives: format conversion, RMS energy, voice activity.
//!
//! Pure, stateless, side-effect-free — no sessions, no recognizers, just
//! bytes in and bytes/floats out. Everything here operates on little-endian
//! packed samples, mono.

use tracing::warn;

/// Number of bytes per sample for a given PCM encoding.
pub fn bytes_per_sample(encoding: AudioEncoding) -> usize {
    match encoding {
        AudioEncoding::Float32 => 4,
        AudioEncoding::Int16 => 2,
    }
}

/// PCM sample encoding understood by the streaming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Float32,
    Int16,
}

/// Convert packed little-endian float32 PCM to packed little-endian int16 PCM.
///
/// Samples are clamped to `[-1.0, 1.0]` before scaling. If `bytes.len()` is
/// not a multiple of 4 the input is returned unchanged and a warning is
/// logged, rather than panicking on a malformed buffer.
pub fn float32_to_int16(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() % 4 != 0 {
        warn!(len = bytes.len(), "float32_to_int16: length not a multiple of 4");
        return bytes.to_vec();
    }

    let mut out = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(4) {
        let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * 32767.0).round() as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Convert packed little-endian int16 PCM to packed little-endian float32 PCM.
///
/// If `bytes.len()` is not a multiple of 2 the input is undefined: the
/// input is returned unchanged and a warning is logged.
pub fn int16_to_float32(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() % 2 != 0 {
        warn!(len = bytes.len(), "int16_to_float32: length not a multiple of 2");
        return bytes.to_vec();
    }

    let mut out = Vec::with_capacity(bytes.len() * 2);
    for chunk in bytes.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        let scaled = sample as f32 / 32767.0;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Interpret `bytes` as packed little-endian float32 samples.
///
/// Returns `None` if the length is not a multiple of 4 (malformed buffer).
pub fn as_float32_samples(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Root-mean-square energy of a slice of float32 samples.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Classify a buffer of float32-encoded PCM as voiced or silent by RMS
/// threshold. Returns `(voiced, rms)`.
///
/// On a malformed buffer (length not a multiple of 4) returns `(false, 0.0)`
/// rather than propagating an error — VAD is advisory and must never abort
/// the dispatcher loop.
pub fn detect_voice_activity(bytes: &[u8], threshold: f32) -> (bool, f32) {
    match as_float32_samples(bytes) {
        Some(samples) => {
            let rms = rms_energy(&samples);
            (rms > threshold, rms)
        }
        None => {
            warn!(len = bytes.len(), "detect_voice_activity: malformed float32 buffer");
            (false, 0.0)
        }
    }
}

/// Duration in seconds of a PCM buffer at the given sample rate and
/// bytes-per-sample.
pub fn duration(bytes: &[u8], sample_rate: u32, bytes_per_sample: usize) -> f64 {
    if sample_rate == 0 || bytes_per_sample == 0 {
        return 0.0;
    }
    let num_samples = bytes.len() as f64 / bytes_per_sample as f64;
    num_samples / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn f32_bytes(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn float32_to_int16_round_trip_within_one_lsb() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25, -0.999];
        let f32_buf = f32_bytes(&samples);
        let int16_buf = float32_to_int16(&f32_buf);
        let back = int16_to_float32(&int16_buf);
        let back_samples = as_float32_samples(&back).unwrap();

        for (original, round_tripped) in samples.iter().zip(back_samples.iter()) {
            assert_relative_eq!(original, round_tripped, epsilon = 1.0 / 32767.0 * 1.01);
        }
    }

    #[test]
    fn float32_to_int16_clamps_out_of_range() {
        let buf = f32_bytes(&[2.0, -2.0]);
        let int16 = float32_to_int16(&buf);
        let back = as_float32_samples(&int16_to_float32(&int16)).unwrap();
        assert_relative_eq!(back[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(back[1], -1.0, epsilon = 1e-3);
    }

    #[test]
    fn float32_to_int16_malformed_length_passes_through() {
        let buf = vec![0u8, 1, 2]; // not a multiple of 4
        let out = float32_to_int16(&buf);
        assert_eq!(out, buf);
    }

    #[test]
    fn int16_to_float32_malformed_length_passes_through() {
        let buf = vec![0u8, 1, 2]; // not a multiple of 2
        let out = int16_to_float32(&buf);
        assert_eq!(out, buf);
    }

    #[test]
    fn rms_energy_of_silence_is_zero() {
        assert_eq!(rms_energy(&[0.0; 100]), 0.0);
    }

    #[test]
    fn rms_energy_of_empty_is_zero() {
        assert_eq!(rms_energy(&[]), 0.0);
    }

    #[test]
    fn rms_energy_of_square_wave() {
        let samples: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert_relative_eq!(rms_energy(&samples), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn detect_voice_activity_above_threshold() {
        let buf = f32_bytes(&vec![0.5f32; 1000]);
        let (voiced, rms) = detect_voice_activity(&buf, 0.3);
        assert!(voiced);
        assert_relative_eq!(rms, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn detect_voice_activity_below_threshold() {
        let buf = f32_bytes(&vec![0.0f32; 1000]);
        let (voiced, rms) = detect_voice_activity(&buf, 0.3);
        assert!(!voiced);
        assert_eq!(rms, 0.0);
    }

    #[test]
    fn detect_voice_activity_malformed_buffer_is_silent() {
        let buf = vec![0u8, 1, 2];
        let (voiced, rms) = detect_voice_activity(&buf, 0.3);
        assert!(!voiced);
        assert_eq!(rms, 0.0);
    }

    #[test]
    fn duration_of_one_second_float32_at_16k() {
        let buf = vec![0u8; 16_000 * 4];
        assert_relative_eq!(duration(&buf, 16_000, 4), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn duration_of_half_second_int16_at_16k() {
        let buf = vec![0u8; 16_000]; // 8000 int16 samples = 0.5s at 16kHz
        assert_relative_eq!(duration(&buf, 16_000, 2), 0.5, epsilon = 1e-9);
    }
}
