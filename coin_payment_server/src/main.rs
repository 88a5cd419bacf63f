use coin_payment_server::{config::ServerConfig, server::run_server};
use dotenvy::dotenv;
use log::*;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if config.database_url.is_empty() {
        error!("🚦️ CPS_DATABASE_URL is not set. Please set it to the URL for the payment database.");
        result = false;
    }
    if !(0..=1023).contains(&config.worker_id) {
        error!(
            "🚦️ CPS_WORKER_ID must be between 0 and 1023, but {} was given. Each server instance needs its own \
             worker id or generated order numbers can collide.",
            config.worker_id
        );
        result = false;
    }
    if config.business.order_timeout_minutes <= 0 {
        error!("🚦️ CPS_ORDER_TIMEOUT_MINUTES must be positive.");
        result = false;
    }
    if config.redis_url.is_none() {
        warn!("🚦️ CPS_REDIS_URL is not set. The payment mutex will not span server instances.");
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
    }
    result
}
