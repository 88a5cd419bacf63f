use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderNo, OrderStatus},
    traits::PaymentGatewayError,
};

/// Inserts a new order with status `CREATED`. The unique index on `request_id` is the backstop
/// for idempotency: a duplicate insert that slips past the pre-checks surfaces as
/// `DuplicateRequest` instead of a second order.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let result = sqlx::query_as::<_, Order>(
        r#"
            INSERT INTO pay_order (
                order_no,
                request_id,
                user_id,
                amount,
                product_type,
                product_id,
                status,
                expired_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#,
    )
    .bind(&order.order_no)
    .bind(&order.request_id)
    .bind(order.user_id)
    .bind(order.amount.value())
    .bind(&order.product_type)
    .bind(&order.product_id)
    .bind(OrderStatus::Created.to_string())
    .bind(order.expired_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            debug!("📝️ Order [{}] inserted", order.order_no);
            Ok(order)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(PaymentGatewayError::DuplicateRequest(order.request_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM pay_order WHERE order_no = $1")
        .bind(order_no.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_request_id(
    request_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM pay_order WHERE request_id = $1")
        .bind(request_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// The guarded status transition: `UPDATE .. WHERE order_no = $x AND status = $from`. Zero
/// affected rows means the order moved (or never existed), and the caller gets
/// `InvalidStatusTransition` with the status actually on record. This is the sole mechanism
/// preventing concurrent conflicting transitions; no row lock is ever taken.
pub async fn transition_status(
    order_no: &OrderNo,
    from: OrderStatus,
    to: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    if !from.can_transition_to(to) {
        return Err(PaymentGatewayError::InvalidStatusTransition { order_no: order_no.clone(), from, to });
    }
    let sql = if to == OrderStatus::Paid {
        r#"UPDATE pay_order SET status = $1, paid_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
           WHERE order_no = $2 AND status = $3 RETURNING *"#
    } else {
        r#"UPDATE pay_order SET status = $1, updated_at = CURRENT_TIMESTAMP
           WHERE order_no = $2 AND status = $3 RETURNING *"#
    };
    let updated: Option<Order> = sqlx::query_as(sql)
        .bind(to.to_string())
        .bind(order_no.as_str())
        .bind(from.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match updated {
        Some(order) => {
            trace!("📝️ Order [{order_no}] moved {from} → {to}");
            Ok(order)
        },
        None => {
            let current = fetch_order_by_order_no(order_no, conn)
                .await?
                .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
            Err(PaymentGatewayError::InvalidStatusTransition { order_no: order_no.clone(), from: current.status, to })
        },
    }
}

/// Unpaid orders whose deadline has passed, oldest first.
pub async fn fetch_expired_orders(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM pay_order WHERE status = $1 AND expired_at < $2 ORDER BY created_at ASC LIMIT $3",
    )
    .bind(OrderStatus::Created.to_string())
    .bind(Utc::now())
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Orders sitting in `PAYING` that have not been touched since `stale_before`.
pub async fn fetch_stale_paying_orders(
    stale_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM pay_order WHERE status = $1 AND updated_at < $2 ORDER BY updated_at ASC LIMIT $3",
    )
    .bind(OrderStatus::Paying.to_string())
    .bind(stale_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// A page of the user's orders, newest first, and the total count for the pager.
pub async fn list_orders_for_user(
    user_id: i64,
    page: u32,
    page_size: u32,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Order>, i64), sqlx::Error> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pay_order WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    let page = page.max(1);
    let offset = i64::from(page - 1) * i64::from(page_size);
    let orders = sqlx::query_as(
        "SELECT * FROM pay_order WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(i64::from(page_size))
    .bind(offset)
    .fetch_all(conn)
    .await?;
    Ok((orders, total))
}
