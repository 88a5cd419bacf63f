use cps_common::IdGenerator;
use log::*;

use crate::{
    api::{RefundReceipt, RefundRequest},
    db_types::{LedgerEntryType, Order, OrderNo, OrderStatus},
    locks::{refund_lock_key, DistributedMutex},
    traits::{KeyValueStore, PaymentGatewayDatabase, PaymentGatewayError},
};

/// `RefundFlowApi` orchestrates one full-amount refund with the same discipline as the pay flow:
/// status and ledger checks before and after taking the per-order mutex, then a single atomic
/// store transaction.
///
/// Refund idempotency rests on two legs: the `PAID → REFUNDING` guard (a second refund finds the
/// order in `REFUNDED` and replays), and the ledger check (at most one `REFUND` row per order).
pub struct RefundFlowApi<B, K> {
    db: B,
    mutex: DistributedMutex<K>,
    ids: IdGenerator,
    pay_result_topic: String,
}

impl<B, K> RefundFlowApi<B, K>
where
    B: PaymentGatewayDatabase,
    K: KeyValueStore,
{
    pub fn new(db: B, store: K, ids: IdGenerator, pay_result_topic: String) -> Self {
        Self { db, mutex: DistributedMutex::new(store), ids, pay_result_topic }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn refund(&self, request: RefundRequest) -> Result<RefundReceipt, PaymentGatewayError> {
        let order_no = OrderNo::from(request.order_no.clone());
        let order = self
            .db
            .fetch_order(&order_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
        if let Some(replay) = self.refundable_or_replay(&order)? {
            return Ok(replay);
        }
        // Ledger check: a REFUND row means the money already went back, even if the status
        // update was lost.
        if self.db.ledger_entry_for_order(&order_no, LedgerEntryType::Refund).await?.is_some() {
            debug!("↩️ Order [{order_no}] already has a refund on record");
            return Ok(RefundReceipt::replayed(&order));
        }

        let key = refund_lock_key(&order_no);
        self.mutex.lock(&key, &request.request_id).await?;
        let result = self.refund_under_mutex(&request, &order_no).await;
        if let Err(e) = self.mutex.unlock(&key, &request.request_id).await {
            warn!("↩️ Could not release {key} after request {}: {e}", request.request_id);
        }
        result
    }

    async fn refund_under_mutex(
        &self,
        request: &RefundRequest,
        order_no: &OrderNo,
    ) -> Result<RefundReceipt, PaymentGatewayError> {
        // Re-read under the mutex to close the window between the first check and the lock.
        let order = self
            .db
            .fetch_order(order_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
        if let Some(replay) = self.refundable_or_replay(&order)? {
            return Ok(replay);
        }
        let refund_no = self.ids.refund_no();
        let refunded = self.db.execute_refund(&order, &refund_no, &request.reason, &self.pay_result_topic).await?;
        info!("↩️ Refund {refund_no} complete: order [{}], user {}, {}", order_no, refunded.user_id, refunded.amount);
        Ok(RefundReceipt::refunded(&refunded, refund_no))
    }

    /// `Ok(None)` when the order is refundable, `Ok(Some(receipt))` when a previous refund should
    /// be replayed, and an error for any other status.
    fn refundable_or_replay(&self, order: &Order) -> Result<Option<RefundReceipt>, PaymentGatewayError> {
        match order.status {
            OrderStatus::Paid => Ok(None),
            OrderStatus::Refunded => Ok(Some(RefundReceipt::replayed(order))),
            from => Err(PaymentGatewayError::InvalidStatusTransition {
                order_no: order.order_no.clone(),
                from,
                to: OrderStatus::Refunding,
            }),
        }
    }
}
