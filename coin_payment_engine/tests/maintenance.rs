//! The background flows: order expiry, compensation of stranded PAYING orders, and the outbox
//! relay.

use chrono::Duration;
use coin_payment_engine::{
    bus::ChannelBus,
    db_types::{LedgerEntryType, OrderNo, OrderStatus, OutboxStatus},
    locks::MemoryKvStore,
    test_utils::prepare_env::prepare_test_env,
    traits::{OrderManagement, PaymentGatewayDatabase},
    AccountApi,
    CreateOrderRequest,
    OrderApi,
    OutboxApi,
    PayFlowApi,
    PayFlowConfig,
    PaymentRequest,
    SqliteDatabase,
};
use cps_common::Coins;

fn create_request(request_id: &str, user_id: i64, amount: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        request_id: request_id.to_string(),
        user_id,
        amount: Coins::from(amount),
        product_type: "COIN_VIDEO".to_string(),
        product_id: "vid-1".to_string(),
    }
}

/// Pushes an order into PAYING, as if a coordinator died mid-flight.
async fn strand_in_paying(db: &SqliteDatabase, order_no: &OrderNo) {
    sqlx::query("UPDATE pay_order SET status = 'PAYING' WHERE order_no = $1")
        .bind(order_no.as_str())
        .execute(db.pool())
        .await
        .unwrap();
}

async fn insert_pay_ledger_row(db: &SqliteDatabase, order_no: &OrderNo, user_id: i64, amount: i64) {
    sqlx::query(
        r#"INSERT INTO account_transaction
           (transaction_no, user_id, order_no, amount, entry_type, balance_before, balance_after, remark)
           VALUES ($1, $2, $3, $4, 'PAY', $5, $6, 'pay')"#,
    )
    .bind(db.ids().transaction_no())
    .bind(user_id)
    .bind(order_no.as_str())
    .bind(-amount)
    .bind(amount)
    .bind(0)
    .execute(db.pool())
    .await
    .unwrap();
}

#[tokio::test]
async fn expiry_sweep_closes_overdue_orders() {
    let db = prepare_test_env().await;
    // A zero timeout makes every order overdue the moment it is created.
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::zero());
    let order = orders.create_order(create_request("req-exp", 1, 30)).await.unwrap();

    let closed = orders.close_expired_orders(100).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].order_no, order.order_no);
    assert_eq!(closed[0].status, OrderStatus::Closed);

    // The sweep is idempotent: nothing is left to close.
    assert!(orders.close_expired_orders(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn expiry_sweep_leaves_live_orders_alone() {
    let db = prepare_test_env().await;
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::minutes(15));
    orders.create_order(create_request("req-live", 1, 30)).await.unwrap();
    assert!(orders.close_expired_orders(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_closed_order_still_replays_on_pay_retry() {
    let db = prepare_test_env().await;
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::zero());
    let accounts = AccountApi::new(db.clone());
    accounts.recharge(6, Coins::from(1000)).await.unwrap();
    let order = orders.create_order(create_request("req-replay", 6, 30)).await.unwrap();
    orders.close_expired_orders(100).await.unwrap();

    // A pay retry with the same request id replays the (now CLOSED) order and debits nothing.
    let pay_api =
        PayFlowApi::new(db.clone(), MemoryKvStore::new(), db.ids().clone(), PayFlowConfig::default());
    let receipt = pay_api
        .pay(PaymentRequest {
            request_id: "req-replay".to_string(),
            user_id: 6,
            amount: Coins::from(30),
            product_type: "COIN_VIDEO".to_string(),
            product_id: "vid-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(receipt.order_no, order.order_no);
    assert_eq!(receipt.status, OrderStatus::Closed);
    assert_eq!(receipt.message, "order already exists");
    assert_eq!(accounts.balance(6).await.unwrap(), Coins::from(1000));
}

#[tokio::test]
async fn compensation_advances_orders_whose_debit_is_on_record() {
    let db = prepare_test_env().await;
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::minutes(15))
        .with_stale_after(Duration::zero());
    let order = orders.create_order(create_request("req-comp", 2, 40)).await.unwrap();
    strand_in_paying(&db, &order.order_no).await;
    insert_pay_ledger_row(&db, &order.order_no, 2, 40).await;

    let result = orders.compensate_stuck_orders(50).await.unwrap();
    assert_eq!(result.marked_paid.len(), 1);
    assert!(result.marked_failed.is_empty());

    let order = db.fetch_order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
}

#[tokio::test]
async fn compensation_fails_timed_out_orders_with_no_debit() {
    let db = prepare_test_env().await;
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::zero())
        .with_stale_after(Duration::zero());
    let order = orders.create_order(create_request("req-dead", 3, 40)).await.unwrap();
    strand_in_paying(&db, &order.order_no).await;

    let result = orders.compensate_stuck_orders(50).await.unwrap();
    assert!(result.marked_paid.is_empty());
    assert_eq!(result.marked_failed.len(), 1);
    assert_eq!(db.fetch_order(&order.order_no).await.unwrap().unwrap().status, OrderStatus::Failed);
}

#[tokio::test]
async fn compensation_leaves_young_orders_for_the_coordinator() {
    let db = prepare_test_env().await;
    let orders = OrderApi::new(db.clone(), db.ids().clone(), Duration::minutes(30))
        .with_stale_after(Duration::zero());
    let order = orders.create_order(create_request("req-young", 4, 40)).await.unwrap();
    strand_in_paying(&db, &order.order_no).await;

    let result = orders.compensate_stuck_orders(50).await.unwrap();
    assert_eq!(result.total(), 0);
    assert_eq!(db.fetch_order(&order.order_no).await.unwrap().unwrap().status, OrderStatus::Paying);
}

#[tokio::test]
async fn relay_publishes_pending_messages_in_order() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    let pay_api =
        PayFlowApi::new(db.clone(), MemoryKvStore::new(), db.ids().clone(), PayFlowConfig::default());
    accounts.recharge(5, Coins::from(1000)).await.unwrap();
    let first = pay_api
        .pay(PaymentRequest {
            request_id: "req-m1".to_string(),
            user_id: 5,
            amount: Coins::from(10),
            product_type: "COIN_VIDEO".to_string(),
            product_id: "vid-1".to_string(),
        })
        .await
        .unwrap();
    let second = pay_api
        .pay(PaymentRequest {
            request_id: "req-m2".to_string(),
            user_id: 5,
            amount: Coins::from(20),
            product_type: "COIN_VIDEO".to_string(),
            product_id: "vid-2".to_string(),
        })
        .await
        .unwrap();

    let (bus, mut rx) = ChannelBus::new(16);
    let relay = OutboxApi::new(db.clone(), bus, 100, 5);
    let stats = relay.drain_once().await.unwrap();
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.retried + stats.failed, 0);

    // FIFO within the tick: the first order's event arrives first.
    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.key, first.order_no.to_string());
    assert_eq!(msg.topic, "pay_result");
    assert!(msg.payload.contains("\"PAID\""));
    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.key, second.order_no.to_string());

    assert!(db.fetch_pending_messages(10).await.unwrap().is_empty());
    // Every business mutation still has its ledger trail.
    let debit = db.ledger_entry_for_order(&first.order_no, LedgerEntryType::Pay).await.unwrap();
    assert!(debit.is_some());
}

#[tokio::test]
async fn relay_retries_and_eventually_parks_failing_messages() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    let pay_api =
        PayFlowApi::new(db.clone(), MemoryKvStore::new(), db.ids().clone(), PayFlowConfig::default());
    accounts.recharge(7, Coins::from(100)).await.unwrap();
    pay_api
        .pay(PaymentRequest {
            request_id: "req-fail".to_string(),
            user_id: 7,
            amount: Coins::from(10),
            product_type: "COIN_VIDEO".to_string(),
            product_id: "vid-1".to_string(),
        })
        .await
        .unwrap();

    // No consumer: every publish fails.
    let (bus, rx) = ChannelBus::new(16);
    drop(rx);
    let relay = OutboxApi::new(db.clone(), bus, 100, 2);

    let stats = relay.drain_once().await.unwrap();
    assert_eq!(stats.retried, 1);
    let stats = relay.drain_once().await.unwrap();
    assert_eq!(stats.failed, 1, "the second failure reaches max_retries and parks the row");

    // FAILED is terminal for the relay; the row is no longer picked up.
    assert!(db.fetch_pending_messages(10).await.unwrap().is_empty());
    let stats = relay.drain_once().await.unwrap();
    assert_eq!(stats.total(), 0);

    let row: (String, i64) =
        sqlx::query_as("SELECT status, retry_count FROM outbox_message LIMIT 1").fetch_one(db.pool()).await.unwrap();
    assert_eq!(row.0, OutboxStatus::Failed.to_string());
    assert_eq!(row.1, 2);
}
