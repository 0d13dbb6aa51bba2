use std::sync::Arc;

use actix_http::{body, Request, Response};
use actix_web::{
    body::BoxBody,
    dev::{Service, ServiceResponse},
    http::{header::HeaderMap, StatusCode},
    test,
    web,
    App,
    Error,
};
use crossflow_engine::{
    providers::{SandboxBalanceOracle, SandboxOfframp, SandboxOnramp, StaticRateSource},
    run_migrations,
    traits::RateSource,
    IdempotencyApi,
    PaymentFlowApi,
    QuoteApi,
    RateCache,
    SqliteDatabase,
};
use serde_json::Value;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    errors::ServerError,
    middleware::IdempotencyMiddlewareFactory,
    routes,
    routes::Providers,
    sse,
};

pub const ALICE: &str = "user_alice";
pub const BOB: &str = "user_bob";

pub async fn test_db() -> SqliteDatabase {
    let url = format!("sqlite://{}/crossflow_server_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    let _ = env_logger::try_init();
    Sqlite::create_database(&url).await.expect("Error creating test database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error opening test database");
    run_migrations(db.pool()).await.expect("Error running migrations");
    db
}

pub fn sandbox_providers() -> Providers {
    Providers {
        onramp: Arc::new(SandboxOnramp::default()),
        offramp: Arc::new(SandboxOfframp::default()),
        oracle: Arc::new(SandboxBalanceOracle::default()),
        rates: Arc::new(StaticRateSource::default()),
    }
}

/// Builds the API application exactly as the server wires it, against the given database and providers.
pub async fn init_app(
    db: SqliteDatabase,
    providers: Providers,
) -> impl Service<Request, Response = ServiceResponse<BoxBody>, Error = Error> {
    let quote_api = QuoteApi::new(RateCache::new(db.clone(), Arc::clone(&providers.rates)));
    let flow_api = PaymentFlowApi::new(db.clone());
    let idempotency_api = Arc::new(IdempotencyApi::new(db));
    let json_config =
        web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into());
    test::init_service(
        App::new()
            .app_data(json_config)
            .app_data(web::Data::new(quote_api))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(providers.clone()))
            .service(routes::health)
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
                    .route("/events/user/{user_id}", web::get().to(sse::user_events::<SqliteDatabase>))
                    .route("/events/{payment_id}", web::get().to(sse::payment_events::<SqliteDatabase>)),
            ),
    )
    .await
}

/// Issues a request and renders service-level errors the way the HTTP layer would, so tests always see the status
/// code, headers and body the client gets.
pub async fn call(
    app: &impl Service<Request, Response = ServiceResponse<BoxBody>, Error = Error>,
    req: Request,
) -> (StatusCode, HeaderMap, String) {
    match test::try_call_service(app, req).await {
        Ok(res) => {
            let status = res.status();
            let headers = res.headers().clone();
            let bytes = test::read_body(res).await;
            (status, headers, String::from_utf8_lossy(&bytes).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let headers = res.headers().clone();
            let (_, body) = Response::from(res).into_parts();
            let bytes = body::to_bytes(body).await.expect("Could not read error body");
            (status, headers, String::from_utf8_lossy(&bytes).into_owned())
        },
    }
}

pub fn post_json(path: &str, user: Option<&str>, idem_key: Option<&str>, body: &Value) -> Request {
    let mut req = test::TestRequest::post().uri(path).set_json(body);
    if let Some(user) = user {
        req = req.insert_header((crate::helpers::USER_ID_HEADER, user));
    }
    if let Some(key) = idem_key {
        req = req.insert_header((crate::helpers::IDEMPOTENCY_KEY_HEADER, key));
    }
    req.to_request()
}

pub fn get(path: &str, user: Option<&str>) -> Request {
    let mut req = test::TestRequest::get().uri(path);
    if let Some(user) = user {
        req = req.insert_header((crate::helpers::USER_ID_HEADER, user));
    }
    req.to_request()
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response was not JSON ({e}): {body}"))
}
