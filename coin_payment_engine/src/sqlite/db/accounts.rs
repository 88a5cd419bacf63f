use cps_common::Coins;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{db_types::Account, traits::AccountApiError};

pub async fn fetch_account_by_user_id(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Account>, AccountApiError> {
    let account = sqlx::query_as("SELECT * FROM account WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

/// Fetches the account for the given user, creating it with a zero balance if it does not exist.
/// The insert ignores a concurrent creation of the same row, so two racing callers both end up
/// reading the one account that won.
pub async fn fetch_or_create_account(user_id: i64, conn: &mut SqliteConnection) -> Result<Account, AccountApiError> {
    if let Some(account) = fetch_account_by_user_id(user_id, &mut *conn).await? {
        return Ok(account);
    }
    let result = sqlx::query("INSERT INTO account (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() > 0 {
        debug!("🧑️ Created account for user {user_id}");
    }
    fetch_account_by_user_id(user_id, conn)
        .await?
        .ok_or(AccountApiError::AccountNotFound(user_id))
}

/// The conditional debit. A single guarded UPDATE is the money-safety primitive: it can never
/// drive the balance negative, and the version predicate means at most one concurrent
/// read-modify-write cycle succeeds.
///
/// When the guard fires (zero rows), the current row is re-read to tell the caller *why*:
/// insufficient balance, or a version that moved underneath them.
pub async fn debit(
    user_id: i64,
    amount: Coins,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<(), AccountApiError> {
    let result = sqlx::query(
        r#"UPDATE account SET
            balance = balance - $1,
            version = version + 1,
            updated_at = CURRENT_TIMESTAMP
        WHERE user_id = $2 AND balance >= $1 AND version = $3"#,
    )
    .bind(amount.value())
    .bind(user_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let account = fetch_account_by_user_id(user_id, conn)
            .await?
            .ok_or(AccountApiError::AccountNotFound(user_id))?;
        if account.balance < amount {
            return Err(AccountApiError::InsufficientBalance);
        }
        return Err(AccountApiError::VersionConflict);
    }
    trace!("🧑️ Debited {amount} from user {user_id}");
    Ok(())
}

/// Credits the account. No version predicate: crediting is always safe, and refund flows enforce
/// at-most-once at the caller level. The version still increments so that concurrent debits
/// observe the mutation.
pub async fn credit(user_id: i64, amount: Coins, conn: &mut SqliteConnection) -> Result<(), AccountApiError> {
    let result = sqlx::query(
        r#"UPDATE account SET
            balance = balance + $1,
            version = version + 1,
            updated_at = CURRENT_TIMESTAMP
        WHERE user_id = $2"#,
    )
    .bind(amount.value())
    .bind(user_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AccountApiError::AccountNotFound(user_id));
    }
    trace!("🧑️ Credited {amount} to user {user_id}");
    Ok(())
}
