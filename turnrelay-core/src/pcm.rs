//! PCM16 ⇄ float32 conversion and recognizer-chunk framing.
//!
//! The chunking formula here intentionally differs from the naive
//! `len(audio - 1) / chunk_stride + 1` some streaming recognizers use: that
//! expression is a stray elementwise subtraction that doesn't truncate
//! anything, it just obscures `len(audio) / chunk_stride + 1`, which then
//! over-counts by one whenever the input divides the stride evenly. The
//! correct chunk count is a plain ceiling division.

use rubato::{FftFixedIn, Resampler};

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode little-endian signed 16-bit PCM into float32 samples in `[-1, 1)`.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Resample `samples` from `src_rate` to [`TARGET_SAMPLE_RATE`] if needed.
pub fn resample_to_target(samples: &[f32], src_rate: u32) -> Vec<f32> {
    if src_rate == TARGET_SAMPLE_RATE || samples.is_empty() {
        return samples.to_vec();
    }

    let chunk_size = samples.len();
    let mut resampler = match FftFixedIn::<f32>::new(
        src_rate as usize,
        TARGET_SAMPLE_RATE as usize,
        chunk_size,
        1,
        1,
    ) {
        Ok(r) => r,
        Err(_) => return samples.to_vec(),
    };

    match resampler.process(&[samples.to_vec()], None) {
        Ok(mut out) => out.remove(0),
        Err(_) => samples.to_vec(),
    }
}

/// Split `audio` (already at [`TARGET_SAMPLE_RATE`]) into `chunk_stride`-sized
/// chunks, ceiling-dividing so the final, possibly short, chunk is kept.
pub fn chunk_audio(audio: &[f32], chunk_stride: usize) -> Vec<Vec<f32>> {
    if chunk_stride == 0 || audio.is_empty() {
        return Vec::new();
    }
    let total_chunks = (audio.len() + chunk_stride - 1) / chunk_stride;
    (0..total_chunks)
        .map(|i| {
            let start = i * chunk_stride;
            let end = (start + chunk_stride).min(audio.len());
            audio[start..end].to_vec()
        })
        .collect()
}

/// Byte-length target for one recognizer chunk at the given chunk duration
/// and source sample rate (16-bit mono PCM).
pub fn chunk_byte_target(chunk_secs: f32, sample_rate: u32) -> usize {
    ((chunk_secs as f64) * (sample_rate as f64) * 2.0).round() as usize
}
