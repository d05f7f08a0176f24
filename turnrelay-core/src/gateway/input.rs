//! Reads transport frames and translates them into bus events.
//!
//! A binary frame is always raw PCM16 audio. A text frame is a JSON object
//! dispatched by its `action` field (falling back to `type`); unknown or
//! malformed text frames are logged and dropped — they never reach the bus.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::events::{
    AudioFrameReceived, Event, EventPayload, VadSpeechEnd, VadSpeechStart,
    WebsocketMessageReceived,
};
use crate::transport::{InboundMessage, TransportReceiver};

const CLIENT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_VAD_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Deserialize)]
struct ControlMessage {
    action: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    confidence: Option<f32>,
}

pub struct InputGateway {
    bus: EventBus,
    receiver: Box<dyn TransportReceiver>,
}

impl InputGateway {
    pub fn new(bus: EventBus, receiver: Box<dyn TransportReceiver>) -> Self {
        Self { bus, receiver }
    }

    /// Read and dispatch messages until the transport closes or errors.
    /// Returns normally in both cases — a read failure ends the loop, it
    /// does not propagate as an `Err`.
    pub async fn handle_message_loop(&mut self) {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(err) => {
                    warn!(error = %err, "transport read failed, ending message loop");
                    return;
                }
            };

            match message {
                InboundMessage::Closed => {
                    debug!("transport closed");
                    return;
                }
                InboundMessage::Binary(bytes) => self.handle_audio_message(bytes).await,
                InboundMessage::Text(text) => self.handle_text_message(text).await,
            }
        }
    }

    async fn handle_audio_message(&self, bytes: Vec<u8>) {
        self.bus
            .emit(
                EventPayload::AudioFrameReceived(AudioFrameReceived {
                    audio_data: bytes,
                    sample_rate: CLIENT_SAMPLE_RATE,
                    channels: 1,
                    audio_format: "pcm_s16le".to_string(),
                    is_final: false,
                }),
                false,
            )
            .await;
    }

    async fn handle_text_message(&self, text: String) {
        // Always published, even if the text doesn't parse as JSON — the
        // raw text is still an observable event on the bus.
        self.bus
            .emit(
                EventPayload::WebsocketMessageReceived(WebsocketMessageReceived {
                    raw_text: text.clone(),
                }),
                false,
            )
            .await;

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                warn!(text = %text, "dropping malformed text frame");
                return;
            }
        };

        let control: ControlMessage = match serde_json::from_value(parsed) {
            Ok(c) => c,
            Err(_) => {
                warn!(text = %text, "dropping unrecognized text frame");
                return;
            }
        };

        let action = control
            .action
            .or(control.kind)
            .unwrap_or_default();
        let confidence = control.confidence.unwrap_or(DEFAULT_VAD_CONFIDENCE);

        match action.as_str() {
            "vad_speech_start" => {
                self.bus
                    .emit(EventPayload::VadSpeechStart(VadSpeechStart { confidence }), false)
                    .await;
            }
            "vad_speech_end" => {
                self.bus
                    .emit(EventPayload::VadSpeechEnd(VadSpeechEnd { confidence }), false)
                    .await;
                // Sentinel final frame: empty audio, is_final=true (invariant 3).
                self.bus
                    .emit(
                        EventPayload::AudioFrameReceived(AudioFrameReceived {
                            audio_data: Vec::new(),
                            sample_rate: CLIENT_SAMPLE_RATE,
                            channels: 1,
                            audio_format: "pcm_s16le".to_string(),
                            is_final: true,
                        }),
                        false,
                    )
                    .await;
            }
            other => {
                warn!(action = other, "dropping unknown control message");
            }
        }
    }
}

/// Used by tests that want to assert on the events `InputGateway` publishes
/// without standing up a full transport.
pub async fn subscribe_events(bus: &EventBus, subject: &str) -> tokio::sync::mpsc::Receiver<Event> {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    bus.subscribe_fn(subject, move |e| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(e).await;
            Ok(())
        }
    });
    rx
}
