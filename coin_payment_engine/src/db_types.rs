use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use cps_common::Coins;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------       OrderNo       ---------------------------------------------------------
/// A lightweight wrapper around the service-generated order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// The order row exists but no money has moved yet.
    Created,
    /// The debit is in flight. Only ever observable after a partial commit or a crash.
    Paying,
    /// The debit committed. Terminal unless a refund is initiated.
    Paid,
    /// The debit could not be completed.
    Failed,
    /// The order expired before payment.
    Closed,
    /// The order was cancelled by the user.
    Cancelled,
    /// The credit-back is in flight.
    Refunding,
    /// The credit-back committed.
    Refunded,
}

impl OrderStatus {
    /// The legal transitions. Everything not listed here is rejected, which is what makes the
    /// guarded status update the sole arbiter of concurrent lifecycle changes.
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Created => &[Paying, Closed, Cancelled],
            Paying => &[Paid, Failed],
            Paid => &[Refunding],
            Refunding => &[Refunded],
            Failed | Closed | Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.next_statuses().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Failed | OrderStatus::Closed | OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paying => "PAYING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunding => "REFUNDING",
            OrderStatus::Refunded => "REFUNDED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "PAYING" => Ok(Self::Paying),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "CLOSED" => Ok(Self::Closed),
            "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDING" => Ok(Self::Refunding),
            "REFUNDED" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------       Account       ---------------------------------------------------------
/// One row per user. Created lazily on first access and never deleted. The version column is the
/// optimistic-concurrency token: every successful mutation increments it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance: Coins,
    pub frozen_amount: Coins,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub request_id: String,
    pub user_id: i64,
    pub amount: Coins,
    pub product_type: String,
    pub product_id: String,
    pub status: OrderStatus,
    pub expired_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The service-generated order number
    pub order_no: OrderNo,
    /// The client-supplied idempotency key
    pub request_id: String,
    pub user_id: i64,
    pub amount: Coins,
    pub product_type: String,
    pub product_id: String,
    /// Unpaid orders past this deadline are closed by the expiry job
    pub expired_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_no: OrderNo, request_id: String, user_id: i64, amount: Coins, timeout: Duration) -> Self {
        Self {
            order_no,
            request_id,
            user_id,
            amount,
            product_type: String::new(),
            product_id: String::new(),
            expired_at: Utc::now() + timeout,
        }
    }

    pub fn with_product(mut self, product_type: String, product_id: String) -> Self {
        self.product_type = product_type;
        self.product_id = product_id;
        self
    }
}

//--------------------------------------   LedgerEntryType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerEntryType {
    Recharge,
    Pay,
    Refund,
}

impl Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Recharge => write!(f, "RECHARGE"),
            LedgerEntryType::Pay => write!(f, "PAY"),
            LedgerEntryType::Refund => write!(f, "REFUND"),
        }
    }
}

//--------------------------------------     LedgerEntry     ---------------------------------------------------------
/// Append-only journal row describing a single balance mutation. Never mutated once written; the
/// before/after snapshot is what makes balances auditable.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub transaction_no: String,
    pub user_id: i64,
    pub order_no: OrderNo,
    /// Negative for debits, positive for credits
    pub amount: Coins,
    pub entry_type: LedgerEntryType,
    pub balance_before: Coins,
    pub balance_after: Coins,
    pub remark: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub transaction_no: String,
    pub user_id: i64,
    pub order_no: OrderNo,
    pub amount: Coins,
    pub entry_type: LedgerEntryType,
    pub balance_before: Coins,
    pub balance_after: Coins,
    pub remark: String,
}

//--------------------------------------     OutboxStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "PENDING"),
            OutboxStatus::Sent => write!(f, "SENT"),
            OutboxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------    OutboxMessage    ---------------------------------------------------------
/// A staged downstream notification. Created in the same transaction as the business mutation it
/// announces; only the relay mutates it afterwards.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxMessage {
    pub id: i64,
    /// Routing and consumer de-duplication key: the order number for pay events, the refund
    /// number for refund events.
    pub message_key: String,
    pub topic: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub message_key: String,
    pub topic: String,
    pub payload: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_lifecycle() {
        use OrderStatus::*;
        assert!(Created.can_transition_to(Paying));
        assert!(Created.can_transition_to(Closed));
        assert!(Created.can_transition_to(Cancelled));
        assert!(Paying.can_transition_to(Paid));
        assert!(Paying.can_transition_to(Failed));
        assert!(Paid.can_transition_to(Refunding));
        assert!(Refunding.can_transition_to(Refunded));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        use OrderStatus::*;
        assert!(!Created.can_transition_to(Paid));
        assert!(!Paying.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Refunded));
        assert!(!Closed.can_transition_to(Paying));
        assert!(!Cancelled.can_transition_to(Created));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Failed.can_transition_to(Paid));
    }

    #[test]
    fn every_status_is_reachable_from_created() {
        use OrderStatus::*;
        let all = [Created, Paying, Paid, Failed, Closed, Cancelled, Refunding, Refunded];
        let mut reachable = vec![Created];
        let mut frontier = vec![Created];
        while let Some(status) = frontier.pop() {
            for &next in status.next_statuses() {
                if !reachable.contains(&next) {
                    reachable.push(next);
                    frontier.push(next);
                }
            }
        }
        for status in all {
            assert!(reachable.contains(&status), "{status} must be reachable from CREATED");
        }
    }

    #[test]
    fn status_string_round_trip() {
        use OrderStatus::*;
        for status in [Created, Paying, Paid, Failed, Closed, Cancelled, Refunding, Refunded] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        use OrderStatus::*;
        for status in [Paid, Failed, Closed, Cancelled, Refunded] {
            assert!(status.is_terminal());
        }
        for status in [Created, Paying, Refunding] {
            assert!(!status.is_terminal());
        }
    }
}
