//! Coin Payment Engine
//!
//! The transactional core of the coin payment service: it debits and credits user balances
//! against durable orders, guarantees exactly-once effects per client-supplied idempotency key,
//! and reliably publishes payment outcomes through a transactional outbox.
//!
//! The library is divided into three main sections:
//! 1. Database management and control. SQLite is the supported backend. You should never need to
//!    access the tables directly; use the public API instead. The exception is the data types,
//!    which are defined in the [`db_types`] module and are public.
//! 2. The flow APIs in [`api`]: payment, refund, accounts, orders and the outbox relay surface.
//!    Each is generic over the backend traits in [`traits`].
//! 3. The concurrency plumbing: the lease-based [`locks`] mutex and the [`bus`] seam the outbox
//!    publishes through.

pub mod api;
pub mod bus;
pub mod db_types;
pub mod events;
pub mod locks;
mod sqlite;
pub mod test_utils;
pub mod traits;

pub use api::{
    AccountApi,
    CreateOrderRequest,
    DrainStats,
    OrderApi,
    OutboxApi,
    PayFlowApi,
    PayFlowConfig,
    PaymentRequest,
    PayReceipt,
    RefundFlowApi,
    RefundReceipt,
    RefundRequest,
};
pub use sqlite::SqliteDatabase;
