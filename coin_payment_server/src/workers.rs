//! The long-lived background loops: the outbox relay, the order expiry job, and the compensation
//! job for orders stranded in PAYING. Do not await the returned handles; they run until aborted
//! during shutdown.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use coin_payment_engine::{
    bus::{BusMessage, ChannelBus},
    OrderApi,
    OutboxApi,
    SqliteDatabase,
};
use cps_common::IdGenerator;
use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

const RELAY_TICK: Duration = Duration::from_millis(100);
const RELAY_BATCH: i64 = 100;
const EXPIRY_TICK: Duration = Duration::from_secs(10);
const EXPIRY_BATCH: i64 = 100;
const COMPENSATION_TICK: Duration = Duration::from_secs(30);
const COMPENSATION_BATCH: i64 = 50;

/// Forwards pending outbox rows to the bus on a fast tick.
pub fn start_outbox_relay(db: SqliteDatabase, bus: ChannelBus, max_retries: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OutboxApi::new(db, bus, RELAY_BATCH, max_retries);
        let mut timer = tokio::time::interval(RELAY_TICK);
        info!("🕰️ Outbox relay started");
        loop {
            timer.tick().await;
            match api.drain_once().await {
                Ok(stats) if stats.total() > 0 => {
                    debug!("🕰️ Relay tick: {} sent, {} retried, {} failed", stats.sent, stats.retried, stats.failed);
                },
                Ok(_) => {},
                Err(e) => error!("🕰️ Error draining the outbox: {e}"),
            }
        }
    })
}

/// Closes unpaid orders whose deadline has passed.
pub fn start_expiry_worker(db: SqliteDatabase, ids: IdGenerator, order_timeout: ChronoDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderApi::new(db, ids, order_timeout);
        let mut timer = tokio::time::interval(EXPIRY_TICK);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            match api.close_expired_orders(EXPIRY_BATCH).await {
                Ok(closed) if !closed.is_empty() => info!("🕰️ {} expired orders closed", closed.len()),
                Ok(_) => {},
                Err(e) => error!("🕰️ Error running the order expiry job: {e}"),
            }
        }
    })
}

/// Drives orders stranded in PAYING to a terminal state by consulting the ledger.
pub fn start_compensation_worker(db: SqliteDatabase, ids: IdGenerator, order_timeout: ChronoDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderApi::new(db, ids, order_timeout);
        let mut timer = tokio::time::interval(COMPENSATION_TICK);
        info!("🕰️ Compensation worker started");
        loop {
            timer.tick().await;
            match api.compensate_stuck_orders(COMPENSATION_BATCH).await {
                Ok(result) if result.total() > 0 => {
                    info!(
                        "🕰️ Compensation tick: {} orders driven to PAID, {} to FAILED",
                        result.marked_paid.len(),
                        result.marked_failed.len()
                    );
                },
                Ok(_) => {},
                Err(e) => error!("🕰️ Error running the compensation job: {e}"),
            }
        }
    })
}

/// Consumes the channel bus and logs the deliveries. In a deployment with an external broker this
/// is where a producer for that broker plugs in.
pub fn start_bus_drain(mut receiver: mpsc::Receiver<BusMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            info!("📬️ Delivered event to {} with key {}: {}", message.topic, message.key, message.payload);
        }
        debug!("📬️ Bus drain shutting down");
    })
}
