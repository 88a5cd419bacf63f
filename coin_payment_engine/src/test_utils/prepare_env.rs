use std::env;

use cps_common::IdGenerator;
use log::*;

use crate::SqliteDatabase;

/// Connects to a fresh database at a random temp path, running the migrations on the way in.
/// Each call gets its own file, so tests never share state.
pub async fn prepare_test_env() -> SqliteDatabase {
    let _ = dotenvy::dotenv();
    let _ = env_logger::try_init();
    let url = random_db_url();
    debug!("🚀️ Preparing test database at {url}");
    let ids = IdGenerator::new(1).expect("worker id 1 is always valid");
    SqliteDatabase::new_with_url(&url, 5, ids).await.expect("Error creating connection to database")
}

pub fn random_db_url() -> String {
    let dir = env::temp_dir();
    format!("sqlite://{}/coin_payments_test_{}.db", dir.display(), rand::random::<u64>())
}
