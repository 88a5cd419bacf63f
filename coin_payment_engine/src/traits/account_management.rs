use cps_common::Coins;
use thiserror::Error;

use crate::db_types::{Account, LedgerEntry};

/// Account reads and the mutations that are safe without an order: lazy creation and recharges.
///
/// Order-bound mutations (debit on pay, credit on refund) deliberately have no public surface
/// here; they only exist inside the atomic flows of
/// [`PaymentGatewayDatabase`](crate::traits::PaymentGatewayDatabase).
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the account for the given user, or `None` if the user has never touched the
    /// service.
    async fn fetch_account(&self, user_id: i64) -> Result<Option<Account>, AccountApiError>;

    /// Fetches the account for the given user, creating an empty one (balance 0, version 0) if it
    /// does not exist yet.
    async fn fetch_or_create_account(&self, user_id: i64) -> Result<Account, AccountApiError>;

    /// Credits the account and appends a `RECHARGE` ledger row in the same transaction, so that
    /// the ledger stays a complete audit trail of every balance change.
    async fn process_recharge(&self, user_id: i64, amount: Coins) -> Result<Account, AccountApiError>;

    /// All ledger rows for the user, oldest first.
    async fn ledger_entries_for_user(&self, user_id: i64) -> Result<Vec<LedgerEntry>, AccountApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Account for user {0} does not exist")]
    AccountNotFound(i64),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("The account was modified concurrently. Retry the operation")]
    VersionConflict,
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}
