use cps_common::Coins;
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderNo, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Client-supplied idempotency key
    pub request_id: String,
    pub user_id: i64,
    pub amount: Coins,
    pub product_type: String,
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayReceipt {
    pub order_no: OrderNo,
    pub status: OrderStatus,
    pub amount: Coins,
    pub message: String,
}

impl PayReceipt {
    pub fn paid(order: &Order) -> Self {
        Self {
            order_no: order.order_no.clone(),
            status: order.status,
            amount: order.amount,
            message: "payment successful".to_string(),
        }
    }

    /// The replay response for a request id that was seen before. The caller gets the order's
    /// current state, whatever it is, so retries converge without new side effects.
    pub fn replayed(order: &Order) -> Self {
        Self {
            order_no: order.order_no.clone(),
            status: order.status,
            amount: order.amount,
            message: "order already exists".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Client-supplied idempotency key
    pub request_id: String,
    pub order_no: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    /// Empty on an idempotent replay, where the original refund number is not re-derivable.
    pub refund_no: String,
    pub order_no: OrderNo,
    pub amount: Coins,
    pub status: OrderStatus,
    pub message: String,
}

impl RefundReceipt {
    pub fn refunded(order: &Order, refund_no: String) -> Self {
        Self {
            refund_no,
            order_no: order.order_no.clone(),
            amount: order.amount,
            status: OrderStatus::Refunded,
            message: "refund successful".to_string(),
        }
    }

    pub fn replayed(order: &Order) -> Self {
        Self {
            refund_no: String::new(),
            order_no: order.order_no.clone(),
            amount: order.amount,
            status: OrderStatus::Refunded,
            message: "order already refunded".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Client-supplied idempotency key
    pub request_id: String,
    pub user_id: i64,
    pub amount: Coins,
    pub product_type: String,
    pub product_id: String,
}
