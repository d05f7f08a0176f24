//! The streaming speech recognizer contract.
//!
//! A real backend (e.g. a local streaming ASR model) implements
//! [`Recognizer`] directly; this module also ships [`EchoRecognizer`], a
//! deterministic stand-in good enough to drive the orchestration pipeline
//! in tests and demos without a real model on hand.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pcm::{chunk_audio, resample_to_target, TARGET_SAMPLE_RATE};

/// Opaque per-utterance recognizer state. The core never inspects this —
/// it only creates a fresh default at the start of an utterance and clears
/// it (replaces with default) once a segment finalizes.
#[derive(Debug, Clone, Default)]
pub struct RecognizerCache {
    pub utterance_index: u64,
}

pub trait Recognizer: Send {
    /// Target chunk duration in seconds — drives `chunk_byte_target` sizing
    /// in the ASR consumer.
    fn chunk_secs(&self) -> f32;

    /// Consume one chunk of already-resampled float32 audio, returning the
    /// text increment produced. `cache` carries state across calls within
    /// one utterance; the caller resets it on `is_final`.
    fn recognize_stream(
        &mut self,
        chunk: &[f32],
        cache: &mut RecognizerCache,
        is_final: bool,
    ) -> String;

    /// Resample (if needed) and split `audio` into recognizer-sized chunks.
    fn get_chunks(&self, audio: &[f32], src_sample_rate: u32) -> Vec<Vec<f32>> {
        let resampled = resample_to_target(audio, src_sample_rate);
        let chunk_stride = (self.chunk_secs() as f64 * TARGET_SAMPLE_RATE as f64).round() as usize;
        chunk_audio(&resampled, chunk_stride.max(1))
    }
}

/// Thread-safe shared handle to a recognizer, analogous to the engine's
/// `ModelHandle` wrapper for its speech model trait object.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn Recognizer>>);

impl RecognizerHandle {
    pub fn new<R: Recognizer + 'static>(recognizer: R) -> Self {
        Self(Arc::new(Mutex::new(recognizer)))
    }
}

impl fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

/// Deterministic recognizer for tests and demo deployments: emits a partial
/// ellipsis while accumulating, then a final transcript describing how much
/// audio it saw. Never fails.
#[derive(Debug, Default)]
pub struct EchoRecognizer {
    chunk_secs: f32,
}

impl EchoRecognizer {
    pub fn new() -> Self {
        Self { chunk_secs: 0.6 }
    }
}

impl Recognizer for EchoRecognizer {
    fn chunk_secs(&self) -> f32 {
        self.chunk_secs
    }

    fn recognize_stream(
        &mut self,
        chunk: &[f32],
        cache: &mut RecognizerCache,
        is_final: bool,
    ) -> String {
        if chunk.is_empty() {
            return String::new();
        }
        cache.utterance_index += 1;
        if is_final {
            format!("[utterance {} samples]", chunk.len())
        } else {
            "…".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_recognizer_partial_then_final() {
        let mut r = EchoRecognizer::new();
        let mut cache = RecognizerCache::default();
        let partial = r.recognize_stream(&[0.1, 0.2, 0.3], &mut cache, false);
        assert_eq!(partial, "…");
        let fin = r.recognize_stream(&[0.1], &mut cache, true);
        assert!(fin.contains("utterance"));
    }

    #[test]
    fn empty_chunk_yields_empty_text() {
        let mut r = EchoRecognizer::new();
        let mut cache = RecognizerCache::default();
        assert_eq!(r.recognize_stream(&[], &mut cache, false), "");
    }

    #[test]
    fn get_chunks_splits_at_target_rate() {
        let r = EchoRecognizer { chunk_secs: 1.0 };
        let audio = vec![0.0f32; TARGET_SAMPLE_RATE as usize * 2];
        let chunks = r.get_chunks(&audio, TARGET_SAMPLE_RATE);
        assert_eq!(chunks.len(), 2);
    }
}
