//! `SqliteDatabase` is a concrete implementation of a coin payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`traits`](crate::traits) module. Every money flow is one `BEGIN .. COMMIT`: a failure at any
//! step rolls the whole flow back, which is what keeps the balance, the order, the ledger and the
//! outbox consistent with each other.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use cps_common::{Coins, IdGenerator};
use log::*;
use sqlx::SqlitePool;

use super::db::{accounts, ledger, new_pool, orders, outbox, run_migrations};
use crate::{
    db_types::{
        Account,
        LedgerEntry,
        LedgerEntryType,
        NewLedgerEntry,
        NewOrder,
        NewOutboxMessage,
        Order,
        OrderNo,
        OrderStatus,
        OutboxMessage,
    },
    events::{OrderPaidEvent, OrderRefundedEvent},
    traits::{
        AccountApiError,
        AccountManagement,
        CompensationResult,
        OrderManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    ids: IdGenerator,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database, runs the embedded migrations, and returns the backend.
    pub async fn new_with_url(
        url: &str,
        max_connections: u32,
        ids: IdGenerator,
    ) -> Result<Self, PaymentGatewayError> {
        let pool = new_pool(url, max_connections).await?;
        run_migrations(&pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
        Ok(Self { url: url.to_string(), pool, ids })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_account(&self, user_id: i64) -> Result<Option<Account>, AccountApiError> {
        let mut conn = self.pool.acquire().await.map_err(AccountApiError::from)?;
        accounts::fetch_account_by_user_id(user_id, &mut conn).await
    }

    async fn fetch_or_create_account(&self, user_id: i64) -> Result<Account, AccountApiError> {
        let mut conn = self.pool.acquire().await.map_err(AccountApiError::from)?;
        accounts::fetch_or_create_account(user_id, &mut conn).await
    }

    async fn process_recharge(&self, user_id: i64, amount: Coins) -> Result<Account, AccountApiError> {
        let mut tx = self.pool.begin().await.map_err(AccountApiError::from)?;
        let account = accounts::fetch_or_create_account(user_id, &mut tx).await?;
        accounts::credit(user_id, amount, &mut tx).await?;
        let entry = NewLedgerEntry {
            transaction_no: self.ids.transaction_no(),
            user_id,
            order_no: OrderNo(String::new()),
            amount,
            entry_type: LedgerEntryType::Recharge,
            balance_before: account.balance,
            balance_after: account.balance + amount,
            remark: "recharge".to_string(),
        };
        ledger::insert_entry(entry, &mut tx).await?;
        let account = accounts::fetch_account_by_user_id(user_id, &mut tx)
            .await?
            .ok_or(AccountApiError::AccountNotFound(user_id))?;
        tx.commit().await.map_err(AccountApiError::from)?;
        debug!("🗃️ Recharged {amount} for user {user_id}. New balance: {}", account.balance);
        Ok(account)
    }

    async fn ledger_entries_for_user(&self, user_id: i64) -> Result<Vec<LedgerEntry>, AccountApiError> {
        let mut conn = self.pool.acquire().await.map_err(AccountApiError::from)?;
        let entries = ledger::list_entries_for_user(user_id, &mut conn).await?;
        Ok(entries)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn create_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(existing) = orders::fetch_order_by_request_id(&order.request_id, &mut conn).await? {
            return Ok((existing, false));
        }
        match orders::insert_order(order.clone(), &mut conn).await {
            Ok(inserted) => Ok((inserted, true)),
            // Lost the race against another writer of the same request id. Replay theirs.
            Err(PaymentGatewayError::DuplicateRequest(_)) => {
                let existing = orders::fetch_order_by_request_id(&order.request_id, &mut conn)
                    .await?
                    .ok_or(PaymentGatewayError::DuplicateRequest(order.request_id))?;
                Ok((existing, false))
            },
            Err(e) => Err(e),
        }
    }

    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_no(order_no, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_request_id(&self, request_id: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_request_id(request_id, &mut conn).await?;
        Ok(order)
    }

    async fn cancel_order(&self, order_no: &OrderNo) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_no(order_no, &mut conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
        let cancelled = orders::transition_status(order_no, order.status, OrderStatus::Cancelled, &mut conn).await?;
        info!("🗃️ Order [{order_no}] cancelled");
        Ok(cancelled)
    }

    async fn list_orders_for_user(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Order>, i64), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::list_orders_for_user(user_id, page, page_size, &mut conn).await?;
        Ok(result)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn execute_payment(
        &self,
        order: NewOrder,
        account: &Account,
        topic: &str,
    ) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(order.clone(), &mut tx).await?;
        // The two-phase walk through PAYING is deliberate: PAYING is the post-commit residue the
        // compensation job keys off if this flow is ever split across commits.
        orders::transition_status(&inserted.order_no, OrderStatus::Created, OrderStatus::Paying, &mut tx).await?;
        accounts::debit(order.user_id, order.amount, account.version, &mut tx).await?;
        let entry = NewLedgerEntry {
            transaction_no: self.ids.transaction_no(),
            user_id: order.user_id,
            order_no: inserted.order_no.clone(),
            amount: -order.amount,
            entry_type: LedgerEntryType::Pay,
            balance_before: account.balance,
            balance_after: account.balance - order.amount,
            remark: format!("pay-{}-{}", order.product_type, order.product_id),
        };
        ledger::insert_entry(entry, &mut tx).await?;
        let paid = orders::transition_status(&inserted.order_no, OrderStatus::Paying, OrderStatus::Paid, &mut tx).await?;
        let payload = serde_json::to_string(&OrderPaidEvent::from(&paid))
            .map_err(|e| PaymentGatewayError::BusError(e.to_string()))?;
        let message = NewOutboxMessage {
            message_key: paid.order_no.to_string(),
            topic: topic.to_string(),
            payload,
        };
        outbox::insert_message(message, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Payment committed: order [{}], user {}, {}",
            paid.order_no, paid.user_id, paid.amount
        );
        Ok(paid)
    }

    async fn execute_refund(
        &self,
        order: &Order,
        refund_no: &str,
        reason: &str,
        topic: &str,
    ) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        orders::transition_status(&order.order_no, OrderStatus::Paid, OrderStatus::Refunding, &mut tx).await?;
        let account = accounts::fetch_account_by_user_id(order.user_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::AccountNotFound(order.user_id))?;
        accounts::credit(order.user_id, order.amount, &mut tx).await?;
        let entry = NewLedgerEntry {
            transaction_no: self.ids.transaction_no(),
            user_id: order.user_id,
            order_no: order.order_no.clone(),
            amount: order.amount,
            entry_type: LedgerEntryType::Refund,
            balance_before: account.balance,
            balance_after: account.balance + order.amount,
            remark: format!("refund-{refund_no}-{reason}"),
        };
        ledger::insert_entry(entry, &mut tx).await?;
        let refunded =
            orders::transition_status(&order.order_no, OrderStatus::Refunding, OrderStatus::Refunded, &mut tx).await?;
        let payload = serde_json::to_string(&OrderRefundedEvent::new(&refunded, refund_no, reason))
            .map_err(|e| PaymentGatewayError::BusError(e.to_string()))?;
        let message = NewOutboxMessage {
            message_key: refund_no.to_string(),
            topic: topic.to_string(),
            payload,
        };
        outbox::insert_message(message, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Refund {refund_no} committed: order [{}], user {}, {}",
            refunded.order_no, refunded.user_id, refunded.amount
        );
        Ok(refunded)
    }

    async fn close_expired_orders(&self, limit: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let expired = orders::fetch_expired_orders(limit, &mut conn).await?;
        let mut closed = Vec::with_capacity(expired.len());
        for order in expired {
            match orders::transition_status(&order.order_no, OrderStatus::Created, OrderStatus::Closed, &mut conn).await
            {
                Ok(order) => {
                    info!("🗃️ Order [{}] expired and was closed", order.order_no);
                    closed.push(order);
                },
                // A concurrent payment advanced the status first; the guard did its job.
                Err(e) => debug!("🗃️ Order [{}] not closed: {e}", order.order_no),
            }
        }
        Ok(closed)
    }

    async fn compensate_stuck_orders(
        &self,
        stale_before: DateTime<Utc>,
        order_timeout: Duration,
        limit: i64,
    ) -> Result<CompensationResult, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let stuck = orders::fetch_stale_paying_orders(stale_before, limit, &mut conn).await?;
        let mut result = CompensationResult::default();
        for order in stuck {
            let debit = ledger::fetch_entry_by_type(&order.order_no, LedgerEntryType::Pay, &mut conn).await?;
            if debit.is_some() {
                // Money moved but the status never advanced. Finish the job.
                match orders::transition_status(&order.order_no, OrderStatus::Paying, OrderStatus::Paid, &mut conn)
                    .await
                {
                    Ok(order) => {
                        warn!("🗃️ Order [{}] had a debit on record and was driven to PAID", order.order_no);
                        result.marked_paid.push(order);
                    },
                    Err(e) => debug!("🗃️ Could not advance order [{}]: {e}", order.order_no),
                }
            } else if Utc::now() - order.created_at > order_timeout {
                match orders::transition_status(&order.order_no, OrderStatus::Paying, OrderStatus::Failed, &mut conn)
                    .await
                {
                    Ok(order) => {
                        warn!("🗃️ Order [{}] timed out with no debit on record and was failed", order.order_no);
                        result.marked_failed.push(order);
                    },
                    Err(e) => debug!("🗃️ Could not fail order [{}]: {e}", order.order_no),
                }
            }
            // Otherwise the order is too young to judge; the in-flight coordinator may still
            // complete it.
        }
        Ok(result)
    }

    async fn ledger_entry_for_order(
        &self,
        order_no: &OrderNo,
        entry_type: LedgerEntryType,
    ) -> Result<Option<LedgerEntry>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let entry = ledger::fetch_entry_by_type(order_no, entry_type, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_pending_messages(&self, limit: i64) -> Result<Vec<OutboxMessage>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let messages = outbox::fetch_pending(limit, &mut conn).await?;
        Ok(messages)
    }

    async fn mark_message_sent(&self, id: i64) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        outbox::mark_sent(id, &mut conn).await?;
        Ok(())
    }

    async fn record_publish_failure(&self, id: i64, max_retries: i64) -> Result<OutboxMessage, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let message = outbox::record_failure(id, max_retries, &mut conn).await?;
        Ok(message)
    }
}
