use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{Account, LedgerEntry, LedgerEntryType, NewOrder, Order, OrderNo, OrderStatus, OutboxMessage},
    locks::LockError,
    traits::{AccountApiError, AccountManagement, BusError, OrderManagement},
};

/// This trait defines the highest level of behaviour for backends supporting the coin payment
/// engine: the atomic money flows, the maintenance flows that drive stranded orders to a terminal
/// state, and the outbox bookkeeping used by the relay.
///
/// Every method that moves money runs as a single store transaction, so a failure anywhere in the
/// flow leaves no partial state behind.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + AccountManagement + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Executes one payment atomically:
    /// * inserts the order with status `CREATED`,
    /// * walks it through `CREATED → PAYING → PAID` via the guarded transitions,
    /// * debits the account conditionally on balance and on the version captured in the
    ///   `account` snapshot,
    /// * appends the `PAY` ledger row with the snapshot's before/after balances,
    /// * stages the paid-order event in the outbox under the given topic.
    ///
    /// A concurrent mutation of the account surfaces as [`PaymentGatewayError::Busy`]; an
    /// insufficient balance at debit time as [`PaymentGatewayError::BalanceNotEnough`]. In both
    /// cases the transaction is rolled back and no trace of the order remains.
    async fn execute_payment(&self, order: NewOrder, account: &Account, topic: &str) -> Result<Order, PaymentGatewayError>;

    /// Executes one full refund atomically: `PAID → REFUNDING`, credit the account, append the
    /// `REFUND` ledger row, `REFUNDING → REFUNDED`, stage the refund event keyed by `refund_no`.
    async fn execute_refund(&self, order: &Order, refund_no: &str, reason: &str, topic: &str) -> Result<Order, PaymentGatewayError>;

    /// Closes unpaid orders whose expiry deadline has passed, via the guarded
    /// `CREATED → CLOSED` transition. A concurrent payment wins the race by advancing the status
    /// first, in which case the order is skipped. Returns the orders that were closed.
    async fn close_expired_orders(&self, limit: i64) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Resolves orders stuck in `PAYING` since before `stale_before` by consulting the ledger:
    /// * a `PAY` ledger row proves the money moved, so the order is driven to `PAID`;
    /// * no ledger row and an order older than `order_timeout` is driven to `FAILED`;
    /// * anything younger is left alone, because the in-flight coordinator may still finish.
    async fn compensate_stuck_orders(
        &self,
        stale_before: DateTime<Utc>,
        order_timeout: Duration,
        limit: i64,
    ) -> Result<CompensationResult, PaymentGatewayError>;

    /// The ledger row of the given type for the order, if any. Used for refund idempotency and by
    /// the compensation flow.
    async fn ledger_entry_for_order(
        &self,
        order_no: &OrderNo,
        entry_type: LedgerEntryType,
    ) -> Result<Option<LedgerEntry>, PaymentGatewayError>;

    /// Up to `limit` outbox rows in `PENDING` status, oldest first.
    async fn fetch_pending_messages(&self, limit: i64) -> Result<Vec<OutboxMessage>, PaymentGatewayError>;

    /// Marks an outbox row as `SENT` after a successful publish.
    async fn mark_message_sent(&self, id: i64) -> Result<(), PaymentGatewayError>;

    /// Records a failed publish: increments the retry count, and flips the row to `FAILED` once
    /// the count reaches `max_retries`. Returns the updated row.
    async fn record_publish_failure(&self, id: i64, max_retries: i64) -> Result<OutboxMessage, PaymentGatewayError>;
}

/// What a compensation sweep did.
#[derive(Debug, Clone, Default)]
pub struct CompensationResult {
    /// Orders advanced `PAYING → PAID` because their debit was found in the ledger
    pub marked_paid: Vec<Order>,
    /// Orders advanced `PAYING → FAILED` because they timed out with no debit on record
    pub marked_failed: Vec<Order>,
}

impl CompensationResult {
    pub fn total(&self) -> usize {
        self.marked_paid.len() + self.marked_failed.len()
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("The system is busy. Please retry in a moment")]
    Busy,
    #[error("Insufficient balance")]
    BalanceNotEnough,
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("Account for user {0} does not exist")]
    AccountNotFound(i64),
    #[error("Order {order_no} cannot move from {from} to {to}")]
    InvalidStatusTransition { order_no: OrderNo, from: OrderStatus, to: OrderStatus },
    #[error("A request with id {0} already exists")]
    DuplicateRequest(String),
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Key-value store error: {0}")]
    CacheError(String),
    #[error("Message bus error: {0}")]
    BusError(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

impl From<AccountApiError> for PaymentGatewayError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::AccountNotFound(user_id) => PaymentGatewayError::AccountNotFound(user_id),
            AccountApiError::InsufficientBalance => PaymentGatewayError::BalanceNotEnough,
            // The optimistic version check fired. The caller may retry the whole flow.
            AccountApiError::VersionConflict => PaymentGatewayError::Busy,
            AccountApiError::DatabaseError(msg) => PaymentGatewayError::DatabaseError(msg),
        }
    }
}

impl From<LockError> for PaymentGatewayError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout { .. } => PaymentGatewayError::Busy,
            LockError::Kv(kv) => PaymentGatewayError::CacheError(kv.0),
        }
    }
}

impl From<BusError> for PaymentGatewayError {
    fn from(e: BusError) -> Self {
        PaymentGatewayError::BusError(e.0)
    }
}
