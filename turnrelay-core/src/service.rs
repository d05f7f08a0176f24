//! Owns one connection's worth of state: the event bus plus the four
//! components wired to it. Construction order matters — the bus must
//! exist before anything subscribes to it — and shutdown order matters
//! too: the turn managers stop producing events before the bus stops
//! delivering them.

use std::sync::Arc;

use tracing::info;

use crate::asr::AsrManager;
use crate::buffer::DEFAULT_CAPACITY;
use crate::bus::EventBus;
use crate::gateway::{InputGateway, OutputGateway};
use crate::recognizer::RecognizerHandle;
use crate::synthesis::SynthesisPipeline;
use crate::transport::Transport;
use crate::tts::TtsManager;

pub struct Service {
    bus: EventBus,
    asr: Arc<AsrManager>,
    tts: Arc<TtsManager>,
    input_gateway: InputGateway,
    _output_gateway: OutputGateway,
}

impl Service {
    pub fn new(
        transport: Transport,
        recognizer: RecognizerHandle,
        pipeline: Arc<dyn SynthesisPipeline>,
        audio_buffer_capacity: Option<usize>,
    ) -> Self {
        let bus = EventBus::new();
        let asr = AsrManager::new(
            bus.clone(),
            recognizer,
            audio_buffer_capacity.unwrap_or(DEFAULT_CAPACITY),
        );
        let tts = TtsManager::new(bus.clone(), pipeline);
        let input_gateway = InputGateway::new(bus.clone(), transport.receiver);
        let output_gateway = OutputGateway::new(&bus, transport.sender);

        Self {
            bus,
            asr,
            tts,
            input_gateway,
            _output_gateway: output_gateway,
        }
    }

    /// Drive this connection to completion: read and dispatch messages
    /// until the transport closes, then tear everything down in order.
    pub async fn run(mut self) {
        self.input_gateway.handle_message_loop().await;
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        info!("service shutting down");
        self.asr.shutdown().await;
        self.tts.shutdown().await;
        self.bus.shutdown(None).await;
    }
}
