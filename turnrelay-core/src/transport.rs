//! Transport-agnostic framing the gateways speak.
//!
//! `InputGateway` only ever reads; `OutputGateway` only ever writes. The
//! two halves are split at construction time (mirroring how an `axum`
//! WebSocket — or any `Sink + Stream` — is split) so reading never blocks
//! writing and vice versa.

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub enum InboundMessage {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

#[async_trait]
pub trait TransportReceiver: Send {
    async fn recv(&mut self) -> Result<InboundMessage>;
}

#[async_trait]
pub trait TransportSender: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<()>;
}

/// A split transport ready to be handed to `Service`.
pub struct Transport {
    pub sender: Box<dyn TransportSender>,
    pub receiver: Box<dyn TransportReceiver>,
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::mpsc;

    pub struct ChannelReceiver(pub mpsc::Receiver<InboundMessage>);
    pub struct ChannelSender(pub mpsc::Sender<OutboundMessage>);

    #[async_trait]
    impl TransportReceiver for ChannelReceiver {
        async fn recv(&mut self) -> Result<InboundMessage> {
            Ok(self.0.recv().await.unwrap_or(InboundMessage::Closed))
        }
    }

    #[async_trait]
    impl TransportSender for ChannelSender {
        async fn send(&mut self, message: OutboundMessage) -> Result<()> {
            self.0
                .send(message)
                .await
                .map_err(|e| crate::error::Error::TransportSend(e.to_string()))
        }
    }

    /// An in-memory transport pair: the test drives `client_tx`/`client_rx`
    /// while the `Transport` returned drives the core under test.
    pub struct TestClient {
        pub to_core: mpsc::Sender<InboundMessage>,
        pub from_core: mpsc::Receiver<OutboundMessage>,
    }

    pub fn channel_pair() -> (TestClient, Transport) {
        let (to_core, from_client) = mpsc::channel(64);
        let (to_client, from_core) = mpsc::channel(64);
        (
            TestClient { to_core, from_core },
            Transport {
                sender: Box::new(ChannelSender(to_client)),
                receiver: Box::new(ChannelReceiver(from_client)),
            },
        )
    }
}
