use std::sync::Arc;

use chrono::Duration;
use coin_payment_engine::{
    db_types::{LedgerEntryType, NewOrder, OrderNo, OrderStatus},
    locks::MemoryKvStore,
    test_utils::prepare_env::prepare_test_env,
    traits::{AccountManagement, OrderManagement, PaymentGatewayDatabase, PaymentGatewayError},
    AccountApi,
    PayFlowApi,
    PayFlowConfig,
    PaymentRequest,
    SqliteDatabase,
};
use cps_common::Coins;

fn pay_api(db: &SqliteDatabase) -> PayFlowApi<SqliteDatabase, MemoryKvStore> {
    PayFlowApi::new(db.clone(), MemoryKvStore::new(), db.ids().clone(), PayFlowConfig::default())
}

fn request(request_id: &str, user_id: i64, amount: i64) -> PaymentRequest {
    PaymentRequest {
        request_id: request_id.to_string(),
        user_id,
        amount: Coins::from(amount),
        product_type: "COIN_VIDEO".to_string(),
        product_id: "vid-1001".to_string(),
    }
}

#[tokio::test]
async fn pay_moves_money_and_writes_the_ledger() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    let api = pay_api(&db);
    accounts.recharge(1, Coins::from(1000)).await.unwrap();

    let receipt = api.pay(request("req-1", 1, 300)).await.unwrap();
    assert_eq!(receipt.status, OrderStatus::Paid);
    assert_eq!(receipt.amount, Coins::from(300));
    assert!(receipt.order_no.as_str().starts_with("PAY"));

    assert_eq!(accounts.balance(1).await.unwrap(), Coins::from(700));

    let order = db.fetch_order(&receipt.order_no).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    let entries = accounts.history(1).await.unwrap();
    assert_eq!(entries.len(), 2, "one RECHARGE row and one PAY row");
    let debit = &entries[1];
    assert_eq!(debit.entry_type, LedgerEntryType::Pay);
    assert_eq!(debit.amount, Coins::from(-300));
    assert_eq!(debit.balance_before, Coins::from(1000));
    assert_eq!(debit.balance_after, Coins::from(700));
    assert_eq!(debit.order_no, receipt.order_no);
    assert!(debit.transaction_no.starts_with("TXN"));

    // Money conservation: the balance equals the ledger sum.
    let total: Coins = entries.iter().map(|e| e.amount).sum();
    assert_eq!(total, Coins::from(700));
}

#[tokio::test]
async fn replayed_request_has_no_side_effects() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    let api = pay_api(&db);
    accounts.recharge(2, Coins::from(1000)).await.unwrap();

    let first = api.pay(request("req-dup", 2, 300)).await.unwrap();
    let second = api.pay(request("req-dup", 2, 300)).await.unwrap();

    assert_eq!(second.order_no, first.order_no);
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(second.amount, Coins::from(300));
    assert_eq!(second.message, "order already exists");
    assert_eq!(accounts.balance(2).await.unwrap(), Coins::from(700));

    let entries = accounts.history(2).await.unwrap();
    let debits = entries.iter().filter(|e| e.entry_type == LedgerEntryType::Pay).count();
    assert_eq!(debits, 1, "a replay must not debit again");

    let (orders, total) = db.list_orders_for_user(2, 1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn insufficient_balance_leaves_no_trace() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    let api = pay_api(&db);
    accounts.recharge(3, Coins::from(100)).await.unwrap();

    let err = api.pay(request("req-poor", 3, 300)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::BalanceNotEnough));

    assert_eq!(accounts.balance(3).await.unwrap(), Coins::from(100));
    assert!(db.fetch_order_by_request_id("req-poor").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_payments_only_spend_what_is_there() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    accounts.recharge(4, Coins::from(1000)).await.unwrap();
    let api = Arc::new(pay_api(&db));

    let a = tokio::spawn({
        let api = Arc::clone(&api);
        async move { api.pay(request("req-a", 4, 800)).await }
    });
    let b = tokio::spawn({
        let api = Arc::clone(&api);
        async move { api.pay(request("req-b", 4, 800)).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let paid = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(PaymentGatewayError::BalanceNotEnough) | Err(PaymentGatewayError::Busy)))
        .count();
    assert_eq!(paid, 1, "exactly one of the two racing payments may succeed");
    assert_eq!(rejected, 1);

    assert_eq!(accounts.balance(4).await.unwrap(), Coins::from(200));
    let entries = accounts.history(4).await.unwrap();
    let debits = entries.iter().filter(|e| e.entry_type == LedgerEntryType::Pay).count();
    assert_eq!(debits, 1);
}

#[tokio::test]
async fn stale_account_snapshot_rolls_back_and_reads_as_busy() {
    let db = prepare_test_env().await;
    let accounts = AccountApi::new(db.clone());
    accounts.recharge(5, Coins::from(1000)).await.unwrap();

    // Capture a snapshot, then move the version underneath it.
    let stale = db.fetch_or_create_account(5).await.unwrap();
    accounts.recharge(5, Coins::from(1)).await.unwrap();

    let order = NewOrder::new(
        OrderNo::from(db.ids().order_no()),
        "req-stale".to_string(),
        5,
        Coins::from(300),
        Duration::minutes(15),
    );
    let err = db.execute_payment(order, &stale, "pay_result").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::Busy));

    // The whole transaction rolled back: no order, no debit, balance untouched.
    assert!(db.fetch_order_by_request_id("req-stale").await.unwrap().is_none());
    assert_eq!(accounts.balance(5).await.unwrap(), Coins::from(1001));
    let entries = accounts.history(5).await.unwrap();
    assert!(entries.iter().all(|e| e.entry_type == LedgerEntryType::Recharge));
}
