//! Snowflake-style id generation and the human-facing number formats built on it.
//!
//! Order, transaction and refund numbers must be globally unique and roughly time-ordered without
//! leaking volumes. A 64-bit snowflake id does this: 41 bits of milliseconds since the 2024-01-01
//! epoch, 10 bits of worker id and a 12-bit per-millisecond sequence.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;

/// 2024-01-01 00:00:00 UTC
const EPOCH_MS: i64 = 1_704_067_200_000;
const WORKER_ID_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u8 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u8 = SEQUENCE_BITS + WORKER_ID_BITS;

/// The suffix of generated numbers is the snowflake id modulo 10^8.
const SUFFIX_MODULUS: i64 = 100_000_000;

#[derive(Debug, Clone, Error)]
#[error("Worker id must be between 0 and {MAX_WORKER_ID}, but {0} was given")]
pub struct InvalidWorkerId(i64);

#[derive(Debug, Default)]
struct IdState {
    last_ms: i64,
    sequence: i64,
}

/// A cloneable snowflake id generator. Clones share the same sequence state, so ids stay unique
/// across every handle in the process.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    worker_id: i64,
    state: Arc<Mutex<IdState>>,
}

impl IdGenerator {
    pub fn new(worker_id: i64) -> Result<Self, InvalidWorkerId> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(InvalidWorkerId(worker_id));
        }
        Ok(Self { worker_id, state: Arc::new(Mutex::new(IdState::default())) })
    }

    /// Generates the next raw snowflake id.
    pub fn next_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut now = Utc::now().timestamp_millis();
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond. Spin until the clock moves on.
                while now <= state.last_ms {
                    now = Utc::now().timestamp_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;
        ((now - EPOCH_MS) << TIMESTAMP_SHIFT) | (self.worker_id << WORKER_ID_SHIFT) | state.sequence
    }

    /// `PAY<YYYYMMDDhhmmss><8-digit suffix>`
    pub fn order_no(&self) -> String {
        self.numbered("PAY")
    }

    /// `TXN<YYYYMMDDhhmmss><8-digit suffix>`
    pub fn transaction_no(&self) -> String {
        self.numbered("TXN")
    }

    /// `REF<YYYYMMDDhhmmss><8-digit suffix>`
    pub fn refund_no(&self) -> String {
        self.numbered("REF")
    }

    fn numbered(&self, prefix: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        format!("{prefix}{stamp}{:08}", self.next_id() % SUFFIX_MODULUS)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn worker_id_bounds() {
        assert!(IdGenerator::new(-1).is_err());
        assert!(IdGenerator::new(1024).is_err());
        assert!(IdGenerator::new(0).is_ok());
        assert!(IdGenerator::new(1023).is_ok());
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let ids = IdGenerator::new(1).unwrap();
        let mut last = 0;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = ids.next_id();
            assert!(id > 0);
            assert!(id >= last, "snowflake ids must be monotonically non-decreasing");
            assert!(seen.insert(id), "snowflake ids must be unique");
            last = id;
        }
    }

    #[test]
    fn number_formats() {
        let ids = IdGenerator::new(7).unwrap();
        let order = ids.order_no();
        let txn = ids.transaction_no();
        let refund = ids.refund_no();
        assert!(order.starts_with("PAY"));
        assert!(txn.starts_with("TXN"));
        assert!(refund.starts_with("REF"));
        for no in [&order, &txn, &refund] {
            assert_eq!(no.len(), 3 + 14 + 8);
            assert!(no[3..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn clones_share_sequence_state() {
        let ids = IdGenerator::new(1).unwrap();
        let other = ids.clone();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(ids.next_id()));
            assert!(seen.insert(other.next_id()));
        }
    }
}
