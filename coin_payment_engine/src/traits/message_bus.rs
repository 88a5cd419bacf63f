use thiserror::Error;

/// The contract with the downstream message bus. The wire protocol is a deployment concern; the
/// engine only ever publishes `(topic, key, payload)` triples staged in the outbox.
///
/// Delivery is at-least-once: the relay republishes until it observes success, so consumers must
/// de-duplicate on the message key.
#[allow(async_fn_in_trait)]
pub trait MessageBus: Clone + Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), BusError>;
}

#[derive(Debug, Clone, Error)]
#[error("Message bus error: {0}")]
pub struct BusError(pub String);
