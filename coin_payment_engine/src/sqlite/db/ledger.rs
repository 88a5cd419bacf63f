use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{LedgerEntry, LedgerEntryType, NewLedgerEntry, OrderNo};

/// Appends a ledger row. The ledger is append-only: nothing in the engine ever updates or
/// deletes a row once it is written.
pub async fn insert_entry(entry: NewLedgerEntry, conn: &mut SqliteConnection) -> Result<LedgerEntry, sqlx::Error> {
    let row: LedgerEntry = sqlx::query_as(
        r#"
            INSERT INTO account_transaction (
                transaction_no,
                user_id,
                order_no,
                amount,
                entry_type,
                balance_before,
                balance_after,
                remark
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#,
    )
    .bind(&entry.transaction_no)
    .bind(entry.user_id)
    .bind(entry.order_no.as_str())
    .bind(entry.amount.value())
    .bind(entry.entry_type.to_string())
    .bind(entry.balance_before.value())
    .bind(entry.balance_after.value())
    .bind(&entry.remark)
    .fetch_one(conn)
    .await?;
    trace!("🧾️ Ledger entry {} recorded for order [{}]", row.transaction_no, row.order_no);
    Ok(row)
}

/// The first ledger row of the given type for the order, if any. One `PAY` row proves the debit
/// happened; one `REFUND` row proves the refund happened.
pub async fn fetch_entry_by_type(
    order_no: &OrderNo,
    entry_type: LedgerEntryType,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, sqlx::Error> {
    let entry = sqlx::query_as(
        "SELECT * FROM account_transaction WHERE order_no = $1 AND entry_type = $2 ORDER BY id ASC LIMIT 1",
    )
    .bind(order_no.as_str())
    .bind(entry_type.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn list_entries_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM account_transaction WHERE user_id = $1 ORDER BY id ASC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
