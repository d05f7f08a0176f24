//! ASR turn manager.
//!
//! State machine: `Idle` (no utterance in progress) / `Listening` (a
//! consumer task is draining the audio buffer into the recognizer). Every
//! `VadSpeechStart` is a hard reset: a fresh buffer, a fresh recognizer
//! cache, and a fresh consumer task.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::buffer::{AudioFrame, AudioFrameBuffer};
use crate::bus::EventBus;
use crate::error::Error;
use crate::events::{AsrResult, EventPayload};
use crate::pcm::{chunk_byte_target, pcm16_to_f32, TARGET_SAMPLE_RATE};
use crate::recognizer::{RecognizerCache, RecognizerHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const PLACEHOLDER_CONFIDENCE: f32 = 0.85;

#[derive(Debug, Default)]
pub struct ConsumerDiagnostics {
    pub processed_chunks: AtomicUsize,
    pub errors: AtomicUsize,
}

struct Shared {
    buffer: Arc<AudioFrameBuffer>,
    listening: AtomicBool,
    diagnostics: Arc<ConsumerDiagnostics>,
}

pub struct AsrManager {
    bus: EventBus,
    recognizer: RecognizerHandle,
    shared: Arc<Shared>,
    consumer: SyncMutex<Option<JoinHandle<()>>>,
    buffer_capacity: usize,
}

impl AsrManager {
    pub fn new(bus: EventBus, recognizer: RecognizerHandle, buffer_capacity: usize) -> Arc<Self> {
        let manager = Arc::new(Self {
            bus,
            recognizer,
            shared: Arc::new(Shared {
                buffer: Arc::new(AudioFrameBuffer::new(buffer_capacity)),
                listening: AtomicBool::new(false),
                diagnostics: Arc::new(ConsumerDiagnostics::default()),
            }),
            consumer: SyncMutex::new(None),
            buffer_capacity,
        });
        manager.setup_event_listeners();
        manager
    }

    fn setup_event_listeners(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.bus.subscribe_fn(
            crate::events::subjects::VAD_SPEECH_START,
            move |_e| {
                let this = Arc::clone(&this);
                async move {
                    this.reset_and_start().await;
                    Ok(())
                }
            },
        );

        let this = Arc::clone(self);
        self.bus.subscribe_fn(
            crate::events::subjects::AUDIO_FRAME_RECEIVED,
            move |e| {
                let this = Arc::clone(&this);
                async move {
                    if let EventPayload::AudioFrameReceived(f) = e.payload {
                        this.on_audio_frame(f);
                    }
                    Ok(())
                }
            },
        );
    }

    fn on_audio_frame(&self, f: crate::events::AudioFrameReceived) {
        if !self.shared.listening.load(Ordering::SeqCst) {
            return;
        }
        let dropped = self.shared.buffer.push(AudioFrame {
            bytes: f.audio_data,
            timestamp: 0.0,
            sample_rate: f.sample_rate,
            is_final: f.is_final,
        });
        if dropped {
            debug!("asr audio buffer full, dropped oldest frame");
        }
    }

    async fn reset_and_start(self: &Arc<Self>) {
        self.stop_consumer().await;
        self.shared.buffer.clear();
        self.shared.diagnostics.processed_chunks.store(0, Ordering::SeqCst);
        self.shared.diagnostics.errors.store(0, Ordering::SeqCst);
        self.shared.listening.store(true, Ordering::SeqCst);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_consumer().await });
        *self.consumer.lock() = Some(handle);
    }

    async fn stop_consumer(&self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Drain the audio buffer, feeding the recognizer in chunk-sized
    /// increments, until the final sentinel frame is processed. Tracks a
    /// running confidence sum/count across the utterance so the final
    /// transcript can report their average (empty utterance -> 0.0).
    async fn run_consumer(self: Arc<Self>) {
        let chunk_secs = self.recognizer.0.lock().chunk_secs();
        let target = chunk_byte_target(chunk_secs, TARGET_SAMPLE_RATE).max(1);

        let mut accumulated: Vec<u8> = Vec::new();
        let mut processed_offset: usize = 0;
        let mut accumulated_text = String::new();
        let mut cache = RecognizerCache::default();
        let mut confidence_sum: f32 = 0.0;
        let mut chunk_count: usize = 0;

        loop {
            let frame = match self.shared.buffer.pop() {
                Some(f) => f,
                None => {
                    if !self.shared.listening.load(Ordering::SeqCst) {
                        return;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            accumulated.extend_from_slice(&frame.bytes);

            if frame.is_final {
                let increment = self.flush(
                    &accumulated[processed_offset..],
                    &mut cache,
                    true,
                );
                match increment {
                    Ok((text, chunks)) => {
                        accumulated_text.push_str(&text);
                        confidence_sum += chunks as f32 * PLACEHOLDER_CONFIDENCE;
                        chunk_count += chunks;
                        let confidence = confidence_sum / chunk_count.max(1) as f32;
                        self.publish_result(&accumulated_text, true, confidence).await;
                    }
                    Err(err) => self.report_error(err).await,
                }
                self.shared.listening.store(false, Ordering::SeqCst);
                return;
            }

            if accumulated.len() - processed_offset >= target {
                let end = accumulated.len();
                let increment = self.flush(&accumulated[processed_offset..end], &mut cache, false);
                match increment {
                    Ok((text, chunks)) => {
                        confidence_sum += chunks as f32 * PLACEHOLDER_CONFIDENCE;
                        chunk_count += chunks;
                        if !text.is_empty() {
                            accumulated_text.push_str(&text);
                            self.publish_result(&accumulated_text, false, PLACEHOLDER_CONFIDENCE)
                                .await;
                        }
                        processed_offset = end - (end % target);
                    }
                    Err(err) => self.report_error(err).await,
                }
            }
        }
    }

    /// Returns the text increment and the number of recognizer chunks it
    /// took to produce it, so the caller can fold the chunk count into the
    /// utterance's running confidence average.
    fn flush(
        &self,
        bytes: &[u8],
        cache: &mut RecognizerCache,
        is_final: bool,
    ) -> Result<(String, usize), Error> {
        if bytes.is_empty() && !is_final {
            return Ok((String::new(), 0));
        }
        let floats = pcm16_to_f32(bytes);
        let mut recognizer = self.recognizer.0.lock();
        let chunks = recognizer.get_chunks(&floats, 48_000);
        let mut text = String::new();
        for chunk in &chunks {
            text.push_str(&recognizer.recognize_stream(chunk, cache, is_final));
        }
        if is_final {
            *cache = RecognizerCache::default();
        }
        self.shared
            .diagnostics
            .processed_chunks
            .fetch_add(chunks.len(), Ordering::SeqCst);
        Ok((text, chunks.len()))
    }

    async fn publish_result(&self, text: &str, is_final: bool, confidence: f32) {
        let subject = if is_final {
            EventPayload::AsrResultFinal(AsrResult {
                text: text.to_string(),
                confidence,
                is_final: true,
            })
        } else {
            EventPayload::AsrResultPartial(AsrResult {
                text: text.to_string(),
                confidence,
                is_final: false,
            })
        };
        self.bus.emit(subject, false).await;
    }

    async fn report_error(&self, err: Error) {
        self.shared.diagnostics.errors.fetch_add(1, Ordering::SeqCst);
        error!(error = %err, "asr consumer error");
        self.bus
            .emit(
                EventPayload::ErrorOccurred(crate::events::ErrorOccurred {
                    error_type: "asr_consumer_error".to_string(),
                    message: err.to_string(),
                }),
                false,
            )
            .await;
    }

    pub fn buffer_len(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub async fn shutdown(&self) {
        self.stop_consumer().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::subjects;
    use crate::gateway::input::subscribe_events;
    use crate::recognizer::EchoRecognizer;
    use std::time::Duration as StdDuration;

    fn pcm_bytes(n_samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n_samples * 2);
        for i in 0..n_samples {
            out.extend_from_slice(&(i as i16).to_le_bytes());
        }
        out
    }

    async fn recv_with_timeout(rx: &mut tokio::sync::mpsc::Receiver<crate::events::Event>) -> crate::events::Event {
        tokio::time::timeout(StdDuration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn emits_final_on_sentinel_frame() {
        let bus = EventBus::new();
        let recognizer = RecognizerHandle::new(EchoRecognizer::new());
        let manager = AsrManager::new(bus.clone(), recognizer, 1000);
        let mut final_rx = subscribe_events(&bus, subjects::ASR_RESULT_FINAL).await;

        bus.emit(
            EventPayload::VadSpeechStart(crate::events::VadSpeechStart { confidence: 0.8 }),
            true,
        )
        .await;

        bus.emit(
            EventPayload::AudioFrameReceived(crate::events::AudioFrameReceived {
                audio_data: pcm_bytes(16_000),
                sample_rate: 48_000,
                channels: 1,
                audio_format: "pcm_s16le".into(),
                is_final: false,
            }),
            false,
        )
        .await;

        bus.emit(
            EventPayload::AudioFrameReceived(crate::events::AudioFrameReceived {
                audio_data: Vec::new(),
                sample_rate: 48_000,
                channels: 1,
                audio_format: "pcm_s16le".into(),
                is_final: true,
            }),
            false,
        )
        .await;

        let event = recv_with_timeout(&mut final_rx).await;
        match event.payload {
            EventPayload::AsrResultFinal(r) => assert!(!r.text.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn empty_utterance_yields_empty_final_text() {
        let bus = EventBus::new();
        let recognizer = RecognizerHandle::new(EchoRecognizer::new());
        let manager = AsrManager::new(bus.clone(), recognizer, 1000);
        let mut final_rx = subscribe_events(&bus, subjects::ASR_RESULT_FINAL).await;

        bus.emit(
            EventPayload::VadSpeechStart(crate::events::VadSpeechStart { confidence: 0.8 }),
            true,
        )
        .await;
        bus.emit(
            EventPayload::AudioFrameReceived(crate::events::AudioFrameReceived {
                audio_data: Vec::new(),
                sample_rate: 48_000,
                channels: 1,
                audio_format: "pcm_s16le".into(),
                is_final: true,
            }),
            false,
        )
        .await;

        let event = recv_with_timeout(&mut final_rx).await;
        match event.payload {
            EventPayload::AsrResultFinal(r) => {
                assert_eq!(r.text, "");
                assert_eq!(r.confidence, 0.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn ignores_audio_while_idle() {
        let bus = EventBus::new();
        let recognizer = RecognizerHandle::new(EchoRecognizer::new());
        let manager = AsrManager::new(bus.clone(), recognizer, 1000);

        bus.emit(
            EventPayload::AudioFrameReceived(crate::events::AudioFrameReceived {
                audio_data: pcm_bytes(100),
                sample_rate: 48_000,
                channels: 1,
                audio_format: "pcm_s16le".into(),
                is_final: false,
            }),
            true,
        )
        .await;

        assert_eq!(manager.buffer_len(), 0);
        manager.shutdown().await;
    }
}
