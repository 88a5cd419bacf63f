//! In-process message bus backed by a tokio mpsc channel.
//!
//! This is the shipped [`MessageBus`] implementation for embedded deployments and tests. The
//! relay publishes into the channel; whatever holds the receiver (a log drain in the server, an
//! assertion loop in tests) plays the role of the downstream consumer.

use log::*;
use tokio::sync::mpsc;

use crate::traits::{BusError, MessageBus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct ChannelBus {
    sender: mpsc::Sender<BusMessage>,
}

impl ChannelBus {
    /// Creates the bus and hands back the consuming end. Dropping the receiver makes every
    /// subsequent publish fail, which is how tests exercise the relay's retry path.
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<BusMessage>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (Self { sender }, receiver)
    }
}

impl MessageBus for ChannelBus {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError> {
        let message = BusMessage { topic: topic.to_string(), key: key.to_string(), payload: payload.to_string() };
        self.sender.send(message).await.map_err(|e| {
            warn!("📬️ Could not deliver message to the bus: {e}");
            BusError(e.to_string())
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_the_consumer() {
        let (bus, mut rx) = ChannelBus::new(4);
        bus.publish("pay_result", "PAY1", "{}").await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, BusMessage { topic: "pay_result".into(), key: "PAY1".into(), payload: "{}".into() });
    }

    #[tokio::test]
    async fn publish_fails_once_the_consumer_is_gone() {
        let (bus, rx) = ChannelBus::new(4);
        drop(rx);
        assert!(bus.publish("pay_result", "PAY1", "{}").await.is_err());
    }
}
