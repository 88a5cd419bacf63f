use log::*;

use crate::{
    db_types::OutboxStatus,
    traits::{MessageBus, PaymentGatewayDatabase, PaymentGatewayError},
};

/// What one relay tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

impl DrainStats {
    pub fn total(&self) -> usize {
        self.sent + self.retried + self.failed
    }
}

/// Forwards pending outbox rows to the message bus, oldest first.
///
/// Delivery is at-least-once: a row is only marked `SENT` after a successful publish, so a crash
/// between publish and mark replays the message. Rows that keep failing are parked as `FAILED`
/// for operator inspection after `max_retries` attempts.
pub struct OutboxApi<B, M> {
    db: B,
    bus: M,
    batch_size: i64,
    max_retries: i64,
}

impl<B, M> OutboxApi<B, M>
where
    B: PaymentGatewayDatabase,
    M: MessageBus,
{
    pub fn new(db: B, bus: M, batch_size: i64, max_retries: i64) -> Self {
        Self { db, bus, batch_size, max_retries }
    }

    /// Publishes one batch of pending messages. A failing row never stops the batch.
    pub async fn drain_once(&self) -> Result<DrainStats, PaymentGatewayError> {
        let pending = self.db.fetch_pending_messages(self.batch_size).await?;
        let mut stats = DrainStats::default();
        for message in pending {
            match self.bus.publish(&message.topic, &message.message_key, &message.payload).await {
                Ok(()) => match self.db.mark_message_sent(message.id).await {
                    Ok(()) => {
                        trace!("📬️ Message {} sent with key {}", message.id, message.message_key);
                        stats.sent += 1;
                    },
                    // The publish went out but the mark failed; the row stays PENDING and will
                    // be republished. Consumers de-duplicate on the message key.
                    Err(e) => error!("📬️ Could not mark message {} as sent: {e}", message.id),
                },
                Err(e) => {
                    warn!("📬️ Publish failed for message {}: {e}", message.id);
                    match self.db.record_publish_failure(message.id, self.max_retries).await {
                        Ok(updated) if updated.status == OutboxStatus::Failed => {
                            error!(
                                "📬️ Message {} exhausted its {} retries and was parked as FAILED",
                                message.id, self.max_retries
                            );
                            stats.failed += 1;
                        },
                        Ok(_) => stats.retried += 1,
                        Err(e) => error!("📬️ Could not record publish failure for message {}: {e}", message.id),
                    }
                },
            }
        }
        Ok(stats)
    }
}
