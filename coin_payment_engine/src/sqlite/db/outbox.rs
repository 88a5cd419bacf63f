use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{NewOutboxMessage, OutboxMessage, OutboxStatus};

/// Stages a message. Always called inside the transaction of the business mutation it announces,
/// so a committed mutation implies a durable pending message.
pub async fn insert_message(
    message: NewOutboxMessage,
    conn: &mut SqliteConnection,
) -> Result<OutboxMessage, sqlx::Error> {
    let row: OutboxMessage = sqlx::query_as(
        r#"
            INSERT INTO outbox_message (message_key, topic, payload, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
        "#,
    )
    .bind(&message.message_key)
    .bind(&message.topic)
    .bind(&message.payload)
    .bind(OutboxStatus::Pending.to_string())
    .fetch_one(conn)
    .await?;
    trace!("📬️ Outbox message {} staged with key {}", row.id, row.message_key);
    Ok(row)
}

/// Up to `limit` pending rows, oldest first. Publication is FIFO within one relay tick.
pub async fn fetch_pending(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<OutboxMessage>, sqlx::Error> {
    let messages = sqlx::query_as(
        "SELECT * FROM outbox_message WHERE status = $1 ORDER BY created_at ASC, id ASC LIMIT $2",
    )
    .bind(OutboxStatus::Pending.to_string())
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(messages)
}

pub async fn mark_sent(id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox_message SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(OutboxStatus::Sent.to_string())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Bumps the retry count and flips the row to `FAILED` once the count reaches `max_retries`, all
/// in one statement. A `FAILED` row is terminal for the relay and needs operator inspection.
pub async fn record_failure(
    id: i64,
    max_retries: i64,
    conn: &mut SqliteConnection,
) -> Result<OutboxMessage, sqlx::Error> {
    let row: OutboxMessage = sqlx::query_as(
        r#"
            UPDATE outbox_message SET
                retry_count = retry_count + 1,
                status = CASE WHEN retry_count + 1 >= $1 THEN $2 ELSE status END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *
        "#,
    )
    .bind(max_retries)
    .bind(OutboxStatus::Failed.to_string())
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(row)
}
