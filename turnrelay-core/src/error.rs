//! Crate-wide error type.
//!
//! This is the Rust-level `Result` error — distinct from the string-keyed
//! `error_type` taxonomy attached to `ErrorOccurred` bus events (see
//! [`crate::events::ErrorOccurred`]). A component converts a caught `Error`
//! to the matching taxonomy string at the point it publishes that event.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport send failed: {0}")]
    TransportSend(String),

    #[error("transport receive failed: {0}")]
    TransportReceive(String),

    #[error("recognizer failed: {0}")]
    Recognizer(String),

    #[error("synthesis pipeline failed: {0}")]
    Synthesis(String),

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps this error to the stable `error_type` string published on
    /// `error.occurred` events (§7 of the orchestration design).
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::TransportSend(_) | Error::TransportReceive(_) => "transport_error",
            Error::Recognizer(_) => "asr_consumer_error",
            Error::Synthesis(_) => "tts_generation_error",
            Error::AlreadyRunning | Error::NotRunning => "state_error",
            Error::ConfigNotFound { .. } | Error::Io(_) => "io_error",
            Error::Other(_) => "event_bus_publish_error",
        }
    }
}
