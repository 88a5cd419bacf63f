//! The public API of the payment engine: one struct per flow, each generic over the backend
//! traits so deployments and tests can swap stores at the seams.

mod account_api;
mod objects;
mod order_api;
mod outbox_api;
mod pay_flow_api;
mod refund_flow_api;

pub use account_api::AccountApi;
pub use objects::{CreateOrderRequest, PaymentRequest, PayReceipt, RefundReceipt, RefundRequest};
pub use order_api::OrderApi;
pub use outbox_api::{DrainStats, OutboxApi};
pub use pay_flow_api::{PayFlowApi, PayFlowConfig};
pub use refund_flow_api::RefundFlowApi;
