//! Event model and the stable subject strings the bus dispatches on.
//!
//! Every event carries `event_id` (opaque, unique) and `timestamp` (seconds
//! since `UNIX_EPOCH`) alongside its payload. The payload's own
//! [`EventPayload::subject`] is the dispatch key — handlers subscribe to a
//! subject string, not a Rust type, mirroring the string-keyed fan-out the
//! conversation engine this crate replaces uses internally.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable subject strings, exported so callers can `subscribe` without
/// typos and without importing the payload types.
pub mod subjects {
    pub const WEBSOCKET_MESSAGE_RECEIVED: &str = "websocket.message_received";
    pub const AUDIO_FRAME_RECEIVED: &str = "audio.frame_received";
    pub const VAD_SPEECH_START: &str = "vad.speech_start";
    pub const VAD_SPEECH_END: &str = "vad.speech_end";
    pub const ASR_RESULT_PARTIAL: &str = "asr.result_partial";
    pub const ASR_RESULT_FINAL: &str = "asr.result_final";
    pub const TTS_STARTED: &str = "tts.started";
    pub const TTS_STOPPED: &str = "tts.stopped";
    pub const TTS_PAUSED: &str = "tts.paused";
    pub const TTS_RESPONSE_UPDATE: &str = "tts.response_update";
    pub const TTS_RESPONSE_FINISH: &str = "tts.response_finish";
    pub const TTS_CHUNK_GENERATED: &str = "tts.chunk_generated";
    pub const TTS_PLAYBACK_FINISHED: &str = "tts.playback_finished";
    pub const ERROR_OCCURRED: &str = "error.occurred";
}

/// An audio frame as it arrives from the transport. `is_final` with empty
/// `audio_data` is the VAD-end sentinel (invariant 3 of the buffer model).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFrameReceived {
    pub audio_data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_format: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadSpeechStart {
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadSpeechEnd {
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsrResult {
    pub text: String,
    pub confidence: f32,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsPaused {
    pub text: String,
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponseUpdate {
    pub text: String,
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponseFinish {
    pub text: String,
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsChunkGenerated {
    pub audio_chunk: Vec<u8>,
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsPlaybackFinished {
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketMessageReceived {
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurred {
    pub error_type: String,
    pub message: String,
}

/// Tagged union of every payload the bus can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum EventPayload {
    #[serde(rename = "websocket.message_received")]
    WebsocketMessageReceived(WebsocketMessageReceived),
    #[serde(rename = "audio.frame_received")]
    AudioFrameReceived(AudioFrameReceived),
    #[serde(rename = "vad.speech_start")]
    VadSpeechStart(VadSpeechStart),
    #[serde(rename = "vad.speech_end")]
    VadSpeechEnd(VadSpeechEnd),
    #[serde(rename = "asr.result_partial")]
    AsrResultPartial(AsrResult),
    #[serde(rename = "asr.result_final")]
    AsrResultFinal(AsrResult),
    #[serde(rename = "tts.paused")]
    TtsPaused(TtsPaused),
    #[serde(rename = "tts.response_update")]
    TtsResponseUpdate(TtsResponseUpdate),
    #[serde(rename = "tts.response_finish")]
    TtsResponseFinish(TtsResponseFinish),
    #[serde(rename = "tts.chunk_generated")]
    TtsChunkGenerated(TtsChunkGenerated),
    #[serde(rename = "tts.playback_finished")]
    TtsPlaybackFinished(TtsPlaybackFinished),
    #[serde(rename = "error.occurred")]
    ErrorOccurred(ErrorOccurred),
}

impl EventPayload {
    /// The dispatch key this payload is published under.
    pub fn subject(&self) -> &'static str {
        use subjects::*;
        match self {
            EventPayload::WebsocketMessageReceived(_) => WEBSOCKET_MESSAGE_RECEIVED,
            EventPayload::AudioFrameReceived(_) => AUDIO_FRAME_RECEIVED,
            EventPayload::VadSpeechStart(_) => VAD_SPEECH_START,
            EventPayload::VadSpeechEnd(_) => VAD_SPEECH_END,
            EventPayload::AsrResultPartial(_) => ASR_RESULT_PARTIAL,
            EventPayload::AsrResultFinal(_) => ASR_RESULT_FINAL,
            EventPayload::TtsPaused(_) => TTS_PAUSED,
            EventPayload::TtsResponseUpdate(_) => TTS_RESPONSE_UPDATE,
            EventPayload::TtsResponseFinish(_) => TTS_RESPONSE_FINISH,
            EventPayload::TtsChunkGenerated(_) => TTS_CHUNK_GENERATED,
            EventPayload::TtsPlaybackFinished(_) => TTS_PLAYBACK_FINISHED,
            EventPayload::ErrorOccurred(_) => ERROR_OCCURRED,
        }
    }
}

/// An envelope dispatched through the bus. Construct via [`Event::new`] —
/// `event_id` and `timestamp` are always freshly generated, never supplied
/// by the caller, so every publish is uniquely identifiable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub timestamp: f64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_secs(),
            payload,
        }
    }

    pub fn subject(&self) -> &'static str {
        self.payload.subject()
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_matches_serde_tag() {
        let e = Event::new(EventPayload::VadSpeechStart(VadSpeechStart { confidence: 0.8 }));
        assert_eq!(e.subject(), subjects::VAD_SPEECH_START);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["eventType"], "vad.speech_start");
    }

    #[test]
    fn two_events_get_distinct_ids() {
        let a = Event::new(EventPayload::TtsPlaybackFinished(TtsPlaybackFinished { task_id: 1 }));
        let b = Event::new(EventPayload::TtsPlaybackFinished(TtsPlaybackFinished { task_id: 1 }));
        assert_ne!(a.event_id, b.event_id);
    }
}
