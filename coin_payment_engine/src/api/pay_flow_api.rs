use chrono::Duration;
use cps_common::IdGenerator;
use log::*;

use crate::{
    api::{PaymentRequest, PayReceipt},
    db_types::{NewOrder, OrderNo},
    locks::{pay_lock_key, DistributedMutex},
    traits::{KeyValueStore, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Debug, Clone)]
pub struct PayFlowConfig {
    /// Unpaid orders are closed this long after creation
    pub order_timeout: Duration,
    /// Topic the paid-order and refund events are staged under
    pub pay_result_topic: String,
}

impl Default for PayFlowConfig {
    fn default() -> Self {
        Self { order_timeout: Duration::minutes(15), pay_result_topic: "pay_result".to_string() }
    }
}

/// `PayFlowApi` orchestrates one payment: idempotency pre-check, per-user mutex, re-check under
/// the mutex, early balance rejection, then the single atomic store transaction.
///
/// The mutex is contention collapse, not correctness. Correctness comes from the conditional
/// debit and the guarded status transitions inside
/// [`execute_payment`](PaymentGatewayDatabase::execute_payment), which hold even if the lease
/// expires mid-flight.
pub struct PayFlowApi<B, K> {
    db: B,
    mutex: DistributedMutex<K>,
    ids: IdGenerator,
    config: PayFlowConfig,
}

impl<B, K> PayFlowApi<B, K>
where
    B: PaymentGatewayDatabase,
    K: KeyValueStore,
{
    pub fn new(db: B, store: K, ids: IdGenerator, config: PayFlowConfig) -> Self {
        Self { db, mutex: DistributedMutex::new(store), ids, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn pay(&self, request: PaymentRequest) -> Result<PayReceipt, PaymentGatewayError> {
        // Unlocked idempotency pre-check. Retries of a finished request short-circuit here
        // without ever contending on the mutex.
        if let Some(existing) = self.db.fetch_order_by_request_id(&request.request_id).await? {
            debug!("💳️ Request {} replayed existing order [{}]", request.request_id, existing.order_no);
            return Ok(PayReceipt::replayed(&existing));
        }

        let key = pay_lock_key(request.user_id);
        self.mutex.lock(&key, &request.request_id).await?;
        let result = self.pay_under_mutex(&request).await;
        // The mutex is released on every exit path. A failed release is only worth a warning:
        // the lease expires on its own.
        if let Err(e) = self.mutex.unlock(&key, &request.request_id).await {
            warn!("💳️ Could not release {key} after request {}: {e}", request.request_id);
        }
        result
    }

    async fn pay_under_mutex(&self, request: &PaymentRequest) -> Result<PayReceipt, PaymentGatewayError> {
        // Re-check under the mutex. This closes the window between the unlocked pre-check and
        // lock acquisition, where a concurrent retry may have completed the payment.
        if let Some(existing) = self.db.fetch_order_by_request_id(&request.request_id).await? {
            debug!("💳️ Request {} completed while waiting for the lock", request.request_id);
            return Ok(PayReceipt::replayed(&existing));
        }

        let account = self.db.fetch_or_create_account(request.user_id).await?;
        // Early rejection only. The authoritative balance check is the conditional debit inside
        // the transaction.
        if account.balance < request.amount {
            debug!(
                "💳️ User {} has {} but wants to spend {}",
                request.user_id, account.balance, request.amount
            );
            return Err(PaymentGatewayError::BalanceNotEnough);
        }

        let order_no = OrderNo::from(self.ids.order_no());
        let order = NewOrder::new(
            order_no,
            request.request_id.clone(),
            request.user_id,
            request.amount,
            self.config.order_timeout,
        )
        .with_product(request.product_type.clone(), request.product_id.clone());
        let paid = self.db.execute_payment(order, &account, &self.config.pay_result_topic).await?;
        info!("💳️ Payment complete: order [{}], user {}, {}", paid.order_no, paid.user_id, paid.amount);
        Ok(PayReceipt::paid(&paid))
    }
}
