use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use coin_payment_engine::{
    bus::ChannelBus,
    locks::{MemoryKvStore, RedisKvStore},
    traits::KeyValueStore,
    AccountApi,
    OrderApi,
    PayFlowApi,
    PayFlowConfig,
    RefundFlowApi,
    SqliteDatabase,
};
use cps_common::IdGenerator;
use log::*;

use crate::{config::ServerConfig, errors::ServerError, routes, workers};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let ids = IdGenerator::new(config.worker_id).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25, ids.clone())
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let (bus, receiver) = ChannelBus::new(1024);
    let order_timeout = Duration::minutes(config.business.order_timeout_minutes);
    let workers = vec![
        workers::start_bus_drain(receiver),
        workers::start_outbox_relay(db.clone(), bus, config.business.max_retry_count),
        workers::start_expiry_worker(db.clone(), ids.clone(), order_timeout),
        workers::start_compensation_worker(db.clone(), ids.clone(), order_timeout),
    ];

    let result = match config.redis_url.clone() {
        Some(url) => {
            let store = RedisKvStore::connect(&url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
            create_server_instance(config, db, ids, store)?.await
        },
        None => {
            warn!(
                "🚀️ CPS_REDIS_URL is not set. Falling back to the in-process mutex store, which is only safe for a \
                 single server instance."
            );
            create_server_instance(config, db, ids, MemoryKvStore::new())?.await
        },
    };

    // The HTTP listener has stopped (after draining in-flight requests); stop the loops too.
    for handle in workers {
        handle.abort();
    }
    result.map_err(ServerError::IOError)
}

pub fn create_server_instance<K>(
    config: ServerConfig,
    db: SqliteDatabase,
    ids: IdGenerator,
    store: K,
) -> Result<Server, ServerError>
where K: KeyValueStore + 'static
{
    let order_timeout = Duration::minutes(config.business.order_timeout_minutes);
    let topic = config.business.pay_result_topic.clone();
    let srv = HttpServer::new(move || {
        let pay_config = PayFlowConfig { order_timeout, pay_result_topic: topic.clone() };
        let pay_api = PayFlowApi::new(db.clone(), store.clone(), ids.clone(), pay_config);
        let refund_api = RefundFlowApi::new(db.clone(), store.clone(), ids.clone(), topic.clone());
        let account_api = AccountApi::new(db.clone());
        let order_api = OrderApi::new(db.clone(), ids.clone(), order_timeout);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U"))
            .app_data(web::Data::new(pay_api))
            .app_data(web::Data::new(refund_api))
            .app_data(web::Data::new(account_api))
            .app_data(web::Data::new(order_api))
            .service(routes::health)
            .service(api_scope::<K>())
    })
    .keep_alive(KeepAlive::Timeout(std::time::Duration::from_secs(600)))
    .shutdown_timeout(5)
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// The `/api/v1` routes. Shared with the endpoint tests, which mount it on a test `App`.
pub fn api_scope<K: KeyValueStore + 'static>() -> actix_web::Scope {
    web::scope("/api/v1")
        .route("/pay/execute", web::post().to(routes::execute_pay::<SqliteDatabase, K>))
        .route("/refund/execute", web::post().to(routes::execute_refund::<SqliteDatabase, K>))
        .route("/order/create", web::post().to(routes::create_order::<SqliteDatabase>))
        .route("/order/detail", web::get().to(routes::order_detail::<SqliteDatabase>))
        .route("/order/list", web::get().to(routes::order_list::<SqliteDatabase>))
        .route("/order/cancel", web::post().to(routes::cancel_order::<SqliteDatabase>))
        .route("/account/balance", web::get().to(routes::balance::<SqliteDatabase>))
        .route("/account/recharge", web::post().to(routes::recharge::<SqliteDatabase>))
}
