use crate::{
    db_types::{NewOrder, Order, OrderNo},
    traits::PaymentGatewayError,
};

/// Order creation and reads. Status is never written directly through this trait; every
/// transition goes through the guarded update inside the backend flows.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Inserts the order, or returns the existing one if the request id was seen before.
    /// The boolean is `true` when a new row was inserted.
    async fn create_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentGatewayError>;

    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, PaymentGatewayError>;

    /// The idempotency lookup: at most one order exists per request id.
    async fn fetch_order_by_request_id(&self, request_id: &str) -> Result<Option<Order>, PaymentGatewayError>;

    /// Cancels the order via the guarded transition from its current status. Fails with
    /// `InvalidStatusTransition` when the lifecycle has no edge to `CANCELLED` (e.g. the order
    /// was already paid).
    async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, PaymentGatewayError>;

    /// A page of the user's orders, newest first, together with the total count.
    async fn list_orders_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Order>, i64), PaymentGatewayError>;
}
