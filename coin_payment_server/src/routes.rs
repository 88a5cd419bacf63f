//! Request handler definitions
//!
//! Define each route and its handler here. Handlers stay thin: validate the parameters, call the
//! engine API, translate the outcome into the `{code, message, data}` envelope. Anything longer
//! belongs in the engine.
//!
//! Handlers are generic over the backend traits; the server registers them with the concrete
//! types via `web::{get,post}().to(handler::<SqliteDatabase, _>)` in
//! [`server`](crate::server).

use actix_web::{get, web, HttpResponse, Responder};
use coin_payment_engine::{
    db_types::OrderNo,
    traits::{AccountManagement, KeyValueStore, PaymentGatewayDatabase},
    AccountApi,
    CreateOrderRequest,
    OrderApi,
    PayFlowApi,
    PaymentRequest,
    RefundFlowApi,
    RefundRequest,
};
use log::*;
use serde_json::json;

use crate::{
    data_objects::{
        error_json,
        ok_json,
        param_error,
        BalanceQuery,
        BalanceResult,
        CancelOrderParams,
        MessageResult,
        OrderDetailQuery,
        OrderListQuery,
        OrderListResult,
        RechargeParams,
    },
    errors::{account_business_code, business_code},
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

//----------------------------------------------    Pay    ----------------------------------------------------
/// POST /api/v1/pay/execute
///
/// The hot path. Exactly-once per `request_id`: a retry replays the stored outcome instead of
/// debiting again.
pub async fn execute_pay<B, K>(
    api: web::Data<PayFlowApi<B, K>>,
    params: web::Json<PaymentRequest>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + 'static,
    K: KeyValueStore + 'static,
{
    let params = params.into_inner();
    trace!("💻️ Received pay request {}", params.request_id);
    if let Err(msg) = validate_payment_params(&params) {
        return param_error(msg);
    }
    match api.pay(params).await {
        Ok(receipt) => ok_json(receipt),
        Err(e) => {
            debug!("💻️ Pay request failed: {e}");
            error_json(business_code(&e), e)
        },
    }
}

fn validate_payment_params(params: &PaymentRequest) -> Result<(), &'static str> {
    if params.request_id.is_empty() {
        return Err("request_id must not be empty");
    }
    if params.user_id <= 0 {
        return Err("user_id must be positive");
    }
    if !params.amount.is_positive() {
        return Err("amount must be greater than zero");
    }
    Ok(())
}

//----------------------------------------------   Refund   ----------------------------------------------------
/// POST /api/v1/refund/execute
pub async fn execute_refund<B, K>(
    api: web::Data<RefundFlowApi<B, K>>,
    params: web::Json<RefundRequest>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase + 'static,
    K: KeyValueStore + 'static,
{
    let params = params.into_inner();
    trace!("💻️ Received refund request {} for order {}", params.request_id, params.order_no);
    if params.request_id.is_empty() || params.order_no.is_empty() {
        return param_error("request_id and order_no must not be empty");
    }
    match api.refund(params).await {
        Ok(receipt) => ok_json(receipt),
        Err(e) => {
            debug!("💻️ Refund request failed: {e}");
            error_json(business_code(&e), e)
        },
    }
}

//----------------------------------------------   Orders   ----------------------------------------------------
/// POST /api/v1/order/create
pub async fn create_order<B>(
    api: web::Data<OrderApi<B>>,
    params: web::Json<CreateOrderRequest>,
) -> HttpResponse
where B: PaymentGatewayDatabase + 'static
{
    let params = params.into_inner();
    if params.request_id.is_empty() {
        return param_error("request_id must not be empty");
    }
    if params.user_id <= 0 {
        return param_error("user_id must be positive");
    }
    if !params.amount.is_positive() {
        return param_error("amount must be greater than zero");
    }
    match api.create_order(params).await {
        Ok(order) => ok_json(json!({
            "order_no": order.order_no,
            "status": order.status,
            "amount": order.amount,
        })),
        Err(e) => error_json(business_code(&e), e),
    }
}

/// GET /api/v1/order/detail?order_no=
pub async fn order_detail<B>(
    api: web::Data<OrderApi<B>>,
    query: web::Query<OrderDetailQuery>,
) -> HttpResponse
where B: PaymentGatewayDatabase + 'static
{
    if query.order_no.is_empty() {
        return param_error("order_no must not be empty");
    }
    let order_no = OrderNo::from(query.into_inner().order_no);
    match api.order_detail(&order_no).await {
        Ok(order) => ok_json(order),
        Err(e) => error_json(business_code(&e), e),
    }
}

/// GET /api/v1/order/list?user_id=&page=&page_size=
pub async fn order_list<B>(
    api: web::Data<OrderApi<B>>,
    query: web::Query<OrderListQuery>,
) -> HttpResponse
where B: PaymentGatewayDatabase + 'static
{
    let query = query.into_inner();
    if query.user_id <= 0 {
        return param_error("user_id must be positive");
    }
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, 100);
    match api.list_orders(query.user_id, page, page_size).await {
        Ok((list, total)) => ok_json(OrderListResult { list, total, page, page_size }),
        Err(e) => error_json(business_code(&e), e),
    }
}

/// POST /api/v1/order/cancel
pub async fn cancel_order<B>(
    api: web::Data<OrderApi<B>>,
    params: web::Json<CancelOrderParams>,
) -> HttpResponse
where B: PaymentGatewayDatabase + 'static
{
    if params.order_no.is_empty() {
        return param_error("order_no must not be empty");
    }
    let order_no = OrderNo::from(params.into_inner().order_no);
    match api.cancel_order(&order_no).await {
        Ok(_) => ok_json(MessageResult::new("order cancelled")),
        Err(e) => {
            debug!("💻️ Could not cancel order [{order_no}]: {e}");
            error_json(business_code(&e), e)
        },
    }
}

//----------------------------------------------  Accounts  ----------------------------------------------------
/// GET /api/v1/account/balance?user_id=
pub async fn balance<B>(
    api: web::Data<AccountApi<B>>,
    query: web::Query<BalanceQuery>,
) -> HttpResponse
where B: AccountManagement + 'static
{
    if query.user_id <= 0 {
        return param_error("user_id must be positive");
    }
    match api.account(query.user_id).await {
        Ok(account) => ok_json(BalanceResult {
            user_id: account.user_id,
            balance: account.balance,
            frozen_amount: account.frozen_amount,
        }),
        Err(e) => error_json(account_business_code(&e), e),
    }
}

/// POST /api/v1/account/recharge
pub async fn recharge<B>(
    api: web::Data<AccountApi<B>>,
    params: web::Json<RechargeParams>,
) -> HttpResponse
where B: AccountManagement + 'static
{
    if params.user_id <= 0 {
        return param_error("user_id must be positive");
    }
    if !params.amount.is_positive() {
        return param_error("amount must be greater than zero");
    }
    match api.recharge(params.user_id, params.amount).await {
        Ok(account) => {
            info!("💻️ User {} recharged {}. New balance: {}", account.user_id, params.amount, account.balance);
            ok_json(MessageResult::new("recharge successful"))
        },
        Err(e) => error_json(account_business_code(&e), e),
    }
}
