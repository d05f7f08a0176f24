//! Subscribes to outbound-facing events and translates them into transport
//! frames. Stateless by design — every handler is a pure translation, and
//! send failures are logged rather than propagated (§4.5/§7).

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::bus::EventBus;
use crate::events::{subjects, Event, EventPayload};
use crate::transport::{OutboundMessage, TransportSender};

pub struct OutputGateway {
    sender: Arc<AsyncMutex<Box<dyn TransportSender>>>,
}

impl OutputGateway {
    /// Construct and subscribe to every outbound event subject on `bus`.
    /// Subscription happens here, during construction, matching how the
    /// other per-connection components wire themselves up.
    pub fn new(bus: &EventBus, sender: Box<dyn TransportSender>) -> Self {
        let gateway = Self {
            sender: Arc::new(AsyncMutex::new(sender)),
        };
        gateway.setup_event_listeners(bus);
        gateway
    }

    fn setup_event_listeners(&self, bus: &EventBus) {
        let sender = Arc::clone(&self.sender);
        bus.subscribe_fn(subjects::ASR_RESULT_PARTIAL, move |e| {
            let sender = Arc::clone(&sender);
            async move { send_asr_update(sender, e, false).await }
        });

        let sender = Arc::clone(&self.sender);
        bus.subscribe_fn(subjects::ASR_RESULT_FINAL, move |e| {
            let sender = Arc::clone(&sender);
            async move { send_asr_update(sender, e, true).await }
        });

        let sender = Arc::clone(&self.sender);
        bus.subscribe_fn(subjects::TTS_RESPONSE_UPDATE, move |e| {
            let sender = Arc::clone(&sender);
            async move { send_tts_text(sender, e, "update_resp").await }
        });

        let sender = Arc::clone(&self.sender);
        bus.subscribe_fn(subjects::TTS_RESPONSE_FINISH, move |e| {
            let sender = Arc::clone(&sender);
            async move { send_tts_text(sender, e, "finish_resp").await }
        });

        let sender = Arc::clone(&self.sender);
        bus.subscribe_fn(subjects::TTS_CHUNK_GENERATED, move |e| {
            let sender = Arc::clone(&sender);
            async move { send_tts_chunk(sender, e).await }
        });
    }
}

async fn send_text(sender: &Arc<AsyncMutex<Box<dyn TransportSender>>>, body: serde_json::Value) {
    let text = body.to_string();
    if let Err(err) = sender.lock().await.send(OutboundMessage::Text(text)).await {
        warn!(error = %err, "output gateway: send failed");
    }
}

async fn send_asr_update(
    sender: Arc<AsyncMutex<Box<dyn TransportSender>>>,
    event: Event,
    is_final: bool,
) -> Result<(), anyhow::Error> {
    let result = match event.payload {
        EventPayload::AsrResultPartial(r) | EventPayload::AsrResultFinal(r) => r,
        other => return Err(anyhow::anyhow!("unexpected payload for ASR update: {other:?}")),
    };
    let action = if is_final { "finish_asr" } else { "update_asr" };
    send_text(
        &sender,
        json!({
            "action": action,
            "data": { "text": result.text, "confidence": result.confidence, "is_final": is_final },
        }),
    )
    .await;
    Ok(())
}

async fn send_tts_text(
    sender: Arc<AsyncMutex<Box<dyn TransportSender>>>,
    event: Event,
    action: &'static str,
) -> Result<(), anyhow::Error> {
    let text = match event.payload {
        EventPayload::TtsResponseUpdate(u) => u.text,
        EventPayload::TtsResponseFinish(f) => f.text,
        other => return Err(anyhow::anyhow!("unexpected payload for TTS text: {other:?}")),
    };
    send_text(&sender, json!({ "action": action, "data": { "text": text } })).await;
    Ok(())
}

async fn send_tts_chunk(
    sender: Arc<AsyncMutex<Box<dyn TransportSender>>>,
    event: Event,
) -> Result<(), anyhow::Error> {
    let chunk = match event.payload {
        EventPayload::TtsChunkGenerated(c) => c,
        other => return Err(anyhow::anyhow!("unexpected payload for TTS chunk: {other:?}")),
    };
    if chunk.audio_chunk.is_empty() {
        return Ok(());
    }
    if let Err(err) = sender
        .lock()
        .await
        .send(OutboundMessage::Binary(chunk.audio_chunk))
        .await
    {
        warn!(error = %err, "output gateway: binary send failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AsrResult, TtsChunkGenerated};
    use crate::transport::test_support::channel_pair;
    use std::time::Duration;

    #[tokio::test]
    async fn asr_partial_becomes_update_asr_frame() {
        let bus = EventBus::new();
        let (mut client, transport) = channel_pair();
        let _gateway = OutputGateway::new(&bus, transport.sender);

        bus.emit(
            EventPayload::AsrResultPartial(AsrResult {
                text: "hel".into(),
                confidence: 0.85,
                is_final: false,
            }),
            true,
        )
        .await;

        let msg = tokio::time::timeout(Duration::from_millis(200), client.from_core.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            OutboundMessage::Text(t) => {
                let v: serde_json::Value = serde_json::from_str(&t).unwrap();
                assert_eq!(v["action"], "update_asr");
                assert_eq!(v["data"]["text"], "hel");
                assert_eq!(v["data"]["is_final"], false);
            }
            _ => panic!("expected text frame"),
        }
    }

    #[tokio::test]
    async fn empty_tts_chunk_produces_no_frame() {
        let bus = EventBus::new();
        let (mut client, transport) = channel_pair();
        let _gateway = OutputGateway::new(&bus, transport.sender);

        bus.emit(
            EventPayload::TtsChunkGenerated(TtsChunkGenerated {
                audio_chunk: Vec::new(),
                task_id: 1,
            }),
            true,
        )
        .await;

        assert!(
            tokio::time::timeout(Duration::from_millis(50), client.from_core.recv())
                .await
                .is_err()
        );
    }
}
