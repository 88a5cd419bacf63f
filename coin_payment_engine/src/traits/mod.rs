//! The behaviour contracts for backends supporting the coin payment engine.
//!
//! The engine never talks to SQLite, Redis or the message bus directly; coordinators and workers
//! are written against these traits so that every store can be swapped out at the seam.

mod account_management;
mod key_value_store;
mod message_bus;
mod order_management;
mod payment_gateway_database;

pub use account_management::{AccountApiError, AccountManagement};
pub use key_value_store::{KeyValueStore, KvError};
pub use message_bus::{BusError, MessageBus};
pub use order_management::OrderManagement;
pub use payment_gateway_database::{CompensationResult, PaymentGatewayDatabase, PaymentGatewayError};
