//! The LLM→TTS synthesis pipeline contract.
//!
//! The upstream collaborator this bridges is conceptually a *synchronous*
//! generator (a blocking model call yielding chunks one at a time). Rather
//! than offload a blocking `next()` call per item from the async consumer,
//! [`SynthesisPipeline::generate_stream`] returns a native async stream
//! backed by a worker thread that feeds a channel — the consumer just
//! awaits the stream, and channel closure plays the role of the upstream
//! generator's `StopIteration`.

use std::pin::Pin;

use futures_core::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// One element of a synthesis stream. `text` is the *cumulative* response
/// text as of this chunk — the TTS manager is responsible for deduping
/// against what it last emitted, not this pipeline.
#[derive(Debug, Clone)]
pub struct SynthesisChunk {
    pub audio_chunk: Vec<u8>,
    pub text: String,
    pub asr_text: String,
}

pub type SynthesisStream = Pin<Box<dyn Stream<Item = SynthesisChunk> + Send>>;

pub trait SynthesisPipeline: Send + Sync {
    /// Begin generating a response to `text`. The returned stream may
    /// yield zero or more chunks before ending; ending with zero chunks is
    /// valid (e.g. the upstream model produced only silence or failed
    /// immediately).
    fn generate_stream(&self, text: String) -> SynthesisStream;
}

/// Deterministic synthesis pipeline for tests and demo deployments: splits
/// `text` on whitespace and emits one chunk per word, with a short silent
/// PCM16 tone standing in for real audio. Never fails.
pub struct ToneSynthesis {
    samples_per_word: usize,
}

impl ToneSynthesis {
    pub fn new() -> Self {
        Self {
            samples_per_word: 1600, // 100ms at 16kHz
        }
    }
}

impl Default for ToneSynthesis {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisPipeline for ToneSynthesis {
    fn generate_stream(&self, text: String) -> SynthesisStream {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let samples_per_word = self.samples_per_word;

        tokio::task::spawn_blocking(move || {
            let words: Vec<&str> = text.split_whitespace().collect();
            let mut cumulative = String::new();
            for (i, word) in words.iter().enumerate() {
                if !cumulative.is_empty() {
                    cumulative.push(' ');
                }
                cumulative.push_str(word);

                let tone = synthesize_tone(samples_per_word, 220.0 + i as f32 * 10.0);
                let chunk = SynthesisChunk {
                    audio_chunk: tone,
                    text: cumulative.clone(),
                    asr_text: cumulative.clone(),
                };
                if tx.blocking_send(chunk).is_err() {
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Produces `n_samples` of a sine tone at `freq_hz`, encoded as PCM16 LE —
/// a stand-in for real synthesized speech.
fn synthesize_tone(n_samples: usize, freq_hz: f32) -> Vec<u8> {
    let sample_rate = 16_000.0f32;
    let mut out = Vec::with_capacity(n_samples * 2);
    for i in 0..n_samples {
        let t = i as f32 / sample_rate;
        let s = (t * freq_hz * std::f32::consts::TAU).sin() * 0.2;
        let sample = (s * i16::MAX as f32) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
