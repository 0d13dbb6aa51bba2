use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use crossflow_engine::{
    providers::{HttpRateSource, SandboxBalanceOracle, SandboxOfframp, SandboxOnramp, StaticRateSource},
    run_migrations,
    traits::RateSource,
    IdempotencyApi,
    PaymentFlowApi,
    QuoteApi,
    RateCache,
    SqliteDatabase,
};
use log::info;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::IdempotencyMiddlewareFactory,
    routes,
    routes::{health, Providers},
    sse,
    workers::{start_payment_worker, start_purge_worker, start_webhook_worker},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    run_migrations(db.pool()).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let providers = build_providers(&config)?;
    start_payment_worker(
        db.clone(),
        Arc::clone(&providers.onramp),
        Arc::clone(&providers.offramp),
        config.provider_timeout,
    );
    if config.webhooks_enabled {
        start_webhook_worker(
            db.clone(),
            config.webhook_url.clone(),
            config.webhook_secret.clone(),
            config.provider_timeout,
        );
    } else {
        info!("📮️ Webhook delivery is disabled. Set CFP_WEBHOOKS_ENABLED=true to turn it on.");
    }
    start_purge_worker(db.clone());
    let srv = create_server_instance(config, db, providers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Assembles the provider set for this deployment: the live rate API when configured (static table otherwise), and
/// the sandbox payment providers. Production onramp/offramp adapters slot in here.
pub fn build_providers(config: &ServerConfig) -> Result<Providers, ServerError> {
    let rates: Arc<dyn RateSource> = match &config.rate_api_url {
        Some(url) => Arc::new(
            HttpRateSource::new(url.clone(), config.rate_api_key.clone(), config.provider_timeout)
                .map_err(|e| ServerError::InitializeError(e.to_string()))?,
        ),
        None => Arc::new(StaticRateSource::default()),
    };
    Ok(Providers {
        onramp: Arc::new(SandboxOnramp::default()),
        offramp: Arc::new(SandboxOfframp::default()),
        oracle: Arc::new(SandboxBalanceOracle::default()),
        rates,
    })
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    providers: Providers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let quote_api = QuoteApi::new(RateCache::new(db.clone(), Arc::clone(&providers.rates)));
        let flow_api = PaymentFlowApi::new(db.clone());
        let idempotency_api = Arc::new(IdempotencyApi::new(db.clone()));
        let json_config = web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("crossflow_api"))
            .app_data(json_config)
            .app_data(web::Data::new(quote_api))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(providers.clone()))
            .service(health)
            .service(
                web::scope("/api/v1")
                    .route("/quote", web::post().to(routes::quote::<SqliteDatabase, Arc<dyn RateSource>>))
                    .service(
                        web::resource("/initiate")
                            .wrap(IdempotencyMiddlewareFactory::new(Arc::clone(&idempotency_api)))
                            .route(web::post().to(routes::initiate::<SqliteDatabase, Arc<dyn RateSource>>)),
                    )
                    .service(
                        web::resource("/confirm")
                            .wrap(IdempotencyMiddlewareFactory::new(idempotency_api))
                            .route(web::post().to(routes::confirm::<SqliteDatabase>)),
                    )
                    .route("/payments", web::get().to(routes::my_payments::<SqliteDatabase>))
                    .route("/payments/{payment_id}", web::get().to(routes::payment_by_id::<SqliteDatabase>))
                    // The user route must register first so "user" is never read as a payment id.
                    .route("/events/user/{user_id}", web::get().to(sse::user_events::<SqliteDatabase>))
                    .route("/events/{payment_id}", web::get().to(sse::payment_events::<SqliteDatabase>)),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
