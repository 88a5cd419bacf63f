use std::{env, fmt::Display, str::FromStr};

use log::*;

const DEFAULT_CPS_HOST: &str = "127.0.0.1";
const DEFAULT_CPS_PORT: u16 = 8080;
const DEFAULT_ORDER_TIMEOUT_MINUTES: i64 = 15;
const DEFAULT_MAX_RETRY_COUNT: i64 = 5;
const DEFAULT_PAY_RESULT_TOPIC: &str = "pay_result";
const DEFAULT_WORKER_ID: i64 = 1;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// When unset, the per-user mutex falls back to the in-process store, which is only safe for
    /// a single server instance.
    pub redis_url: Option<String>,
    pub worker_id: i64,
    pub business: BusinessConfig,
}

#[derive(Debug, Clone)]
pub struct BusinessConfig {
    /// Unpaid orders are closed this many minutes after creation
    pub order_timeout_minutes: i64,
    /// Publish attempts per outbox row before it is parked as FAILED
    pub max_retry_count: i64,
    pub pay_result_topic: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            order_timeout_minutes: DEFAULT_ORDER_TIMEOUT_MINUTES,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            pay_result_topic: DEFAULT_PAY_RESULT_TOPIC.to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPS_HOST.to_string(),
            port: DEFAULT_CPS_PORT,
            database_url: String::default(),
            redis_url: None,
            worker_id: DEFAULT_WORKER_ID,
            business: BusinessConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CPS_HOST").ok().unwrap_or_else(|| DEFAULT_CPS_HOST.into());
        let port = parse_var("CPS_PORT", DEFAULT_CPS_PORT);
        let database_url = env::var("CPS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("CPS_DATABASE_URL is not set. Please set it to the URL for the payment database.");
            String::default()
        });
        let redis_url = env::var("CPS_REDIS_URL").ok();
        let worker_id = parse_var("CPS_WORKER_ID", DEFAULT_WORKER_ID);
        let business = BusinessConfig {
            order_timeout_minutes: parse_var("CPS_ORDER_TIMEOUT_MINUTES", DEFAULT_ORDER_TIMEOUT_MINUTES),
            max_retry_count: parse_var("CPS_MAX_RETRY_COUNT", DEFAULT_MAX_RETRY_COUNT),
            pay_result_topic: env::var("CPS_PAY_RESULT_TOPIC").ok().unwrap_or_else(|| DEFAULT_PAY_RESULT_TOPIC.into()),
        };
        Self { host, port, database_url, redis_url, worker_id, business }
    }
}

fn parse_var<T: FromStr + Display>(key: &str, default: T) -> T
where T::Err: Display {
    match env::var(key) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("{s} is not a valid value for {key}. {e}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
