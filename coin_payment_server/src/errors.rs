use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use coin_payment_engine::traits::{AccountApiError, PaymentGatewayError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).insert_header(ContentType::html()).body(self.to_string())
    }
}

/// Business codes carried in the `{code, message, data}` envelope. HTTP status is 200 for every
/// business response; `code = 0` means success.
pub mod codes {
    pub const SUCCESS: i64 = 0;
    pub const PARAM_ERROR: i64 = 400;
    pub const SERVER_ERROR: i64 = 500;
    pub const BUSINESS_ERROR: i64 = 1000;
    pub const ORDER_NOT_FOUND: i64 = 1001;
    pub const ORDER_STATUS_INVALID: i64 = 1002;
    pub const BALANCE_NOT_ENOUGH: i64 = 1003;
    pub const DUPLICATE_REQUEST: i64 = 1004;
    pub const ACCOUNT_NOT_FOUND: i64 = 1005;
}

/// Maps an engine error to its business code. Infrastructure faults read as 500; everything the
/// caller can act on gets a 1000-range code.
pub fn business_code(e: &PaymentGatewayError) -> i64 {
    match e {
        PaymentGatewayError::Busy => codes::BUSINESS_ERROR,
        PaymentGatewayError::BalanceNotEnough => codes::BALANCE_NOT_ENOUGH,
        PaymentGatewayError::OrderNotFound(_) => codes::ORDER_NOT_FOUND,
        PaymentGatewayError::AccountNotFound(_) => codes::ACCOUNT_NOT_FOUND,
        PaymentGatewayError::InvalidStatusTransition { .. } => codes::ORDER_STATUS_INVALID,
        PaymentGatewayError::DuplicateRequest(_) => codes::DUPLICATE_REQUEST,
        PaymentGatewayError::DatabaseError(_)
        | PaymentGatewayError::CacheError(_)
        | PaymentGatewayError::BusError(_) => codes::SERVER_ERROR,
    }
}

pub fn account_business_code(e: &AccountApiError) -> i64 {
    match e {
        AccountApiError::AccountNotFound(_) => codes::ACCOUNT_NOT_FOUND,
        AccountApiError::InsufficientBalance => codes::BALANCE_NOT_ENOUGH,
        AccountApiError::VersionConflict => codes::BUSINESS_ERROR,
        AccountApiError::DatabaseError(_) => codes::SERVER_ERROR,
    }
}
