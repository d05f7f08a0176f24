//! TTS turn manager.
//!
//! State machine: `Idle` / `Speaking` / `Paused`. Every `AsrResultFinal`
//! starts a brand-new turn: the task-id counter is bumped, any previous
//! generator/consumer pair is cancelled, and a fresh pair is spawned for
//! the new `task_id`. Barge-in (`VadSpeechStart` while speaking) only
//! pauses the consumer — the generator keeps running, but its output sits
//! in the queue tagged with the now-stale `task_id` until the next final
//! transcript discards it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::bus::EventBus;
use crate::events::{
    subjects, EventPayload, TtsChunkGenerated, TtsPaused, TtsResponseFinish, TtsResponseUpdate,
};
use crate::synthesis::SynthesisPipeline;

const CONSUMER_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct TtsQueueItem {
    task_id: u64,
    audio_chunk: Vec<u8>,
    resp_text: String,
    is_final: bool,
}

struct Shared {
    current_task_id: AtomicU64,
    is_paused: AtomicBool,
    current_text: SyncMutex<String>,
}

pub struct TtsManager {
    bus: EventBus,
    pipeline: Arc<dyn SynthesisPipeline>,
    shared: Arc<Shared>,
    generator_handle: SyncMutex<Option<JoinHandle<()>>>,
    consumer_handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl TtsManager {
    pub fn new(bus: EventBus, pipeline: Arc<dyn SynthesisPipeline>) -> Arc<Self> {
        let manager = Arc::new(Self {
            bus,
            pipeline,
            shared: Arc::new(Shared {
                current_task_id: AtomicU64::new(0),
                is_paused: AtomicBool::new(false),
                current_text: SyncMutex::new(String::new()),
            }),
            generator_handle: SyncMutex::new(None),
            consumer_handle: SyncMutex::new(None),
        });
        manager.setup_event_listeners();
        manager
    }

    fn setup_event_listeners(self: &Arc<Self>) {
        let this = Arc::clone(self);
        self.bus.subscribe_fn(subjects::ASR_RESULT_FINAL, move |e| {
            let this = Arc::clone(&this);
            async move {
                if let EventPayload::AsrResultFinal(r) = e.payload {
                    this.handle_asr_result_final(r.text).await;
                }
                Ok(())
            }
        });

        let this = Arc::clone(self);
        self.bus.subscribe_fn(subjects::VAD_SPEECH_START, move |_e| {
            let this = Arc::clone(&this);
            async move {
                this.handle_vad_speech_start().await;
                Ok(())
            }
        });

        let this = Arc::clone(self);
        self.bus
            .subscribe_fn(subjects::TTS_PLAYBACK_FINISHED, move |_e| {
                let this = Arc::clone(&this);
                async move {
                    this.reset().await;
                    Ok(())
                }
            });
    }

    async fn handle_asr_result_final(self: &Arc<Self>, text: String) {
        self.reset().await;
        if text.is_empty() {
            return;
        }

        let task_id = self.shared.current_task_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.is_paused.store(false, Ordering::SeqCst);
        *self.shared.current_text.lock() = String::new();

        let (tx, rx) = mpsc::channel::<TtsQueueItem>(256);

        let pipeline = Arc::clone(&self.pipeline);
        let gen_handle = tokio::spawn(run_generator(task_id, text, pipeline, tx));
        *self.generator_handle.lock() = Some(gen_handle);

        let shared = Arc::clone(&self.shared);
        let bus = self.bus.clone();
        let con_handle = tokio::spawn(run_consumer(task_id, shared, rx, bus));
        *self.consumer_handle.lock() = Some(con_handle);
    }

    async fn handle_vad_speech_start(self: &Arc<Self>) {
        self.shared.is_paused.store(true, Ordering::SeqCst);
        let task_id = self.shared.current_task_id.load(Ordering::SeqCst);
        let text = self.shared.current_text.lock().clone();
        self.bus
            .emit(EventPayload::TtsPaused(TtsPaused { text, task_id }), false)
            .await;
    }

    async fn reset(&self) {
        self.shared.is_paused.store(false, Ordering::SeqCst);
        if let Some(h) = self.generator_handle.lock().take() {
            h.abort();
        }
        if let Some(h) = self.consumer_handle.lock().take() {
            h.abort();
        }
    }

    pub async fn shutdown(&self) {
        self.reset().await;
    }
}

async fn run_generator(
    task_id: u64,
    text: String,
    pipeline: Arc<dyn SynthesisPipeline>,
    tx: mpsc::Sender<TtsQueueItem>,
) {
    let mut resp_text = String::new();
    let mut stream = pipeline.generate_stream(text);

    while let Some(chunk) = stream.next().await {
        if !resp_text.ends_with(chunk.text.as_str()) {
            resp_text.push_str(&chunk.text);
        }
        let item = TtsQueueItem {
            task_id,
            audio_chunk: chunk.audio_chunk,
            resp_text: resp_text.clone(),
            is_final: false,
        };
        if tx.send(item).await.is_err() {
            return;
        }
    }

    if !resp_text.is_empty() {
        let _ = tx
            .send(TtsQueueItem {
                task_id,
                audio_chunk: Vec::new(),
                resp_text,
                is_final: true,
            })
            .await;
    }
}

async fn run_consumer(
    task_id: u64,
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<TtsQueueItem>,
    bus: EventBus,
) {
    let mut last_sent_text = String::new();

    loop {
        if shared.is_paused.load(Ordering::SeqCst) {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            continue;
        }

        let item = match tokio::time::timeout(CONSUMER_POLL_TIMEOUT, rx.recv()).await {
            Ok(Some(item)) => item,
            Ok(None) => return,
            Err(_) => continue,
        };

        if item.task_id != shared.current_task_id.load(Ordering::SeqCst) {
            continue;
        }

        if !item.audio_chunk.is_empty() {
            bus.emit(
                EventPayload::TtsChunkGenerated(TtsChunkGenerated {
                    audio_chunk: item.audio_chunk,
                    task_id,
                }),
                false,
            )
            .await;
        }

        if item.resp_text != last_sent_text {
            *shared.current_text.lock() = item.resp_text.clone();
            last_sent_text = item.resp_text.clone();
            bus.emit(
                EventPayload::TtsResponseUpdate(TtsResponseUpdate {
                    text: item.resp_text.clone(),
                    task_id,
                }),
                false,
            )
            .await;
        }

        if item.is_final {
            bus.emit(
                EventPayload::TtsResponseFinish(TtsResponseFinish {
                    text: item.resp_text,
                    task_id,
                }),
                false,
            )
            .await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AsrResult;
    use crate::gateway::input::subscribe_events;
    use crate::synthesis::ToneSynthesis;
    use std::time::Duration as StdDuration;

    async fn recv_with_timeout(
        rx: &mut tokio::sync::mpsc::Receiver<crate::events::Event>,
    ) -> crate::events::Event {
        tokio::time::timeout(StdDuration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn final_transcript_drives_full_turn_to_completion() {
        let bus = EventBus::new();
        let manager = TtsManager::new(bus.clone(), Arc::new(ToneSynthesis::new()));
        let mut finish_rx = subscribe_events(&bus, subjects::TTS_RESPONSE_FINISH).await;

        bus.emit(
            EventPayload::AsrResultFinal(AsrResult {
                text: "hello there".into(),
                confidence: 0.85,
                is_final: true,
            }),
            true,
        )
        .await;

        let event = recv_with_timeout(&mut finish_rx).await;
        match event.payload {
            EventPayload::TtsResponseFinish(f) => assert_eq!(f.text, "hello there"),
            other => panic!("unexpected: {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn empty_transcript_produces_no_turn() {
        let bus = EventBus::new();
        let manager = TtsManager::new(bus.clone(), Arc::new(ToneSynthesis::new()));
        let mut chunk_rx = subscribe_events(&bus, subjects::TTS_CHUNK_GENERATED).await;

        bus.emit(
            EventPayload::AsrResultFinal(AsrResult {
                text: String::new(),
                confidence: 0.85,
                is_final: true,
            }),
            true,
        )
        .await;

        assert!(
            tokio::time::timeout(StdDuration::from_millis(80), chunk_rx.recv())
                .await
                .is_err()
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn barge_in_publishes_paused_and_invalidates_old_turn() {
        let bus = EventBus::new();
        let manager = TtsManager::new(bus.clone(), Arc::new(ToneSynthesis::new()));
        let mut paused_rx = subscribe_events(&bus, subjects::TTS_PAUSED).await;

        bus.emit(
            EventPayload::AsrResultFinal(AsrResult {
                text: "one two three four five".into(),
                confidence: 0.85,
                is_final: true,
            }),
            true,
        )
        .await;

        bus.emit(
            EventPayload::VadSpeechStart(crate::events::VadSpeechStart { confidence: 0.9 }),
            true,
        )
        .await;

        let event = recv_with_timeout(&mut paused_rx).await;
        matches!(event.payload, EventPayload::TtsPaused(_));
        manager.shutdown().await;
    }
}
