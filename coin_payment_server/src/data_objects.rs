use std::fmt::Display;

use actix_web::HttpResponse;
use coin_payment_engine::db_types::Order;
use cps_common::Coins;
use serde::{Deserialize, Serialize};

use crate::errors::codes;

/// The envelope every business response is wrapped in. HTTP status stays 200; the `code` field
/// carries the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn ok_json<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse { code: codes::SUCCESS, message: "success".to_string(), data: Some(data) })
}

pub fn error_json<M: Display>(code: i64, message: M) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::<()> { code, message: message.to_string(), data: None })
}

pub fn param_error<M: Display>(message: M) -> HttpResponse {
    error_json(codes::PARAM_ERROR, message)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceQuery {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResult {
    pub user_id: i64,
    pub balance: Coins,
    pub frozen_amount: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RechargeParams {
    pub user_id: i64,
    pub amount: Coins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailQuery {
    pub order_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub user_id: i64,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderListResult {
    pub list: Vec<Order>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderParams {
    pub order_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResult {
    pub message: String,
}

impl MessageResult {
    pub fn new<M: Display>(message: M) -> Self {
        Self { message: message.to_string() }
    }
}
