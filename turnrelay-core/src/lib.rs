//! `turnrelay-core` — per-connection voice-conversation orchestration.
//!
//! ## Data flow
//!
//! ```text
//! transport ──► InputGateway ──┐
//!                               │ events
//!                               ▼
//!                          EventBus ──► ASRManager ──► TTSManager
//!                               ▲                         │
//!                               └─────────────────────────┘
//!                               │ events
//!                               ▼
//!                          OutputGateway ──► transport
//! ```
//!
//! One [`Service`] owns one [`EventBus`] and the four components above for
//! the lifetime of a single connection. Nothing here is shared across
//! connections — callers construct a fresh `Service` per accepted socket.
//!
//! Concrete `Recognizer` and `SynthesisPipeline` backends are out of scope:
//! this crate ships only deterministic stand-ins (`recognizer::EchoRecognizer`,
//! `synthesis::ToneSynthesis`) good enough to exercise the full pipeline.

#![warn(clippy::all)]

pub mod asr;
pub mod buffer;
pub mod bus;
pub mod error;
pub mod events;
pub mod gateway;
pub mod pcm;
pub mod recognizer;
pub mod service;
pub mod synthesis;
pub mod transport;
pub mod tts;

pub use bus::EventBus;
pub use error::{Error, Result};
pub use events::{Event, EventPayload};
pub use recognizer::Recognizer;
pub use service::Service;
pub use synthesis::SynthesisPipeline;
pub use transport::Transport;
