use chrono::{Duration, Utc};
use cps_common::IdGenerator;
use log::*;

use crate::{
    api::CreateOrderRequest,
    db_types::{NewOrder, Order, OrderNo},
    traits::{CompensationResult, PaymentGatewayDatabase, PaymentGatewayError},
};

/// Order creation (without balance side effects), reads, cancellation, and the maintenance entry
/// points the background jobs tick through.
pub struct OrderApi<B> {
    db: B,
    ids: IdGenerator,
    order_timeout: Duration,
    /// PAYING orders untouched for this long are considered stranded
    stale_after: Duration,
}

impl<B> OrderApi<B>
where B: PaymentGatewayDatabase
{
    pub fn new(db: B, ids: IdGenerator, order_timeout: Duration) -> Self {
        Self { db, ids, order_timeout, stale_after: Duration::minutes(5) }
    }

    /// The stale threshold must exceed the longest possible store commit latency; tune per
    /// environment.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates an order in `CREATED` status, idempotent on the request id. No money moves here;
    /// payment is a separate step.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, PaymentGatewayError> {
        let order = NewOrder::new(
            OrderNo::from(self.ids.order_no()),
            request.request_id,
            request.user_id,
            request.amount,
            self.order_timeout,
        )
        .with_product(request.product_type, request.product_id);
        let (order, inserted) = self.db.create_order(order).await?;
        if inserted {
            info!("📝️ Order [{}] created for user {}", order.order_no, order.user_id);
        }
        Ok(order)
    }

    pub async fn order_detail(&self, order_no: &OrderNo) -> Result<Order, PaymentGatewayError> {
        self.db
            .fetch_order(order_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))
    }

    pub async fn list_orders(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Order>, i64), PaymentGatewayError> {
        self.db.list_orders_for_user(user_id, page, page_size).await
    }

    pub async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, PaymentGatewayError> {
        self.db.cancel_order(order_no).await
    }

    /// One expiry sweep: close unpaid orders whose deadline has passed.
    pub async fn close_expired_orders(&self, limit: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        self.db.close_expired_orders(limit).await
    }

    /// One compensation sweep over orders stranded in `PAYING`.
    pub async fn compensate_stuck_orders(&self, limit: i64) -> Result<CompensationResult, PaymentGatewayError> {
        let stale_before = Utc::now() - self.stale_after;
        self.db.compensate_stuck_orders(stale_before, self.order_timeout, limit).await
    }
}
