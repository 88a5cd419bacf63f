//! The self-describing event payloads staged in the outbox.
//!
//! Both events go to the configured pay-result topic. Consumers de-duplicate on the message key:
//! the order number for paid orders, the refund number for refunds.

use chrono::{DateTime, Utc};
use cps_common::Coins;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderNo, OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order_no: OrderNo,
    pub user_id: i64,
    pub amount: Coins,
    pub product_type: String,
    pub product_id: String,
    pub status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderPaidEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_no: order.order_no.clone(),
            user_id: order.user_id,
            amount: order.amount,
            product_type: order.product_type.clone(),
            product_id: order.product_id.clone(),
            status: order.status,
            paid_at: order.paid_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub refund_no: String,
    pub order_no: OrderNo,
    pub user_id: i64,
    pub amount: Coins,
    pub status: OrderStatus,
    pub reason: String,
    pub refunded_at: DateTime<Utc>,
}

impl OrderRefundedEvent {
    pub fn new(order: &Order, refund_no: &str, reason: &str) -> Self {
        Self {
            refund_no: refund_no.to_string(),
            order_no: order.order_no.clone(),
            user_id: order.user_id,
            amount: order.amount,
            status: order.status,
            reason: reason.to_string(),
            refunded_at: Utc::now(),
        }
    }
}
