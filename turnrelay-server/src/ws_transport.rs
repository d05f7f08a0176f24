//! Adapts an `axum` WebSocket to the core's [`Transport`] halves.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use turnrelay_core::error::{Error, Result};
use turnrelay_core::transport::{InboundMessage, OutboundMessage, Transport, TransportReceiver, TransportSender};

pub struct WsSender(SplitSink<WebSocket, Message>);
pub struct WsReceiver(SplitStream<WebSocket>);

pub fn split(socket: WebSocket) -> Transport {
    let (sink, stream) = socket.split();
    Transport {
        sender: Box::new(WsSender(sink)),
        receiver: Box::new(WsReceiver(stream)),
    }
}

#[async_trait]
impl TransportSender for WsSender {
    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        let msg = match message {
            OutboundMessage::Text(t) => Message::Text(t),
            OutboundMessage::Binary(b) => Message::Binary(b),
        };
        self.0
            .send(msg)
            .await
            .map_err(|e| Error::TransportSend(e.to_string()))
    }
}

#[async_trait]
impl TransportReceiver for WsReceiver {
    async fn recv(&mut self) -> Result<InboundMessage> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(t))) => return Ok(InboundMessage::Text(t)),
                Some(Ok(Message::Binary(b))) => return Ok(InboundMessage::Binary(b)),
                Some(Ok(Message::Close(_))) | None => return Ok(InboundMessage::Closed),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Err(e)) => return Err(Error::TransportReceive(e.to_string())),
            }
        }
    }
}
