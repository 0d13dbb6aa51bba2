//! Idempotency middleware for Actix Web.
//!
//! This middleware provides exactly-once semantics for the mutating endpoints it wraps. Callers send a UUID v4 in
//! the `Idempotency-Key` header; the middleware fingerprints the raw request body (SHA-256) and keeps the captured
//! response for 24 hours under the `(endpoint, user, key)` triple.
//!
//! * A repeat request with the same key and body gets the stored response replayed verbatim, with
//!   `Idempotent-Replayed: true` added. No handler code runs.
//! * A repeat request with the same key but a different body is rejected with `409 Conflict`.
//! * Two racing first requests may both execute; the payment store's unique constraints backstop double-creation.

use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_http::{h1, Response};
use actix_web::{
    body,
    body::BoxBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorInternalServerError,
    http::StatusCode,
    web,
    Error,
    HttpResponse,
};
use crossflow_engine::{
    body_fingerprint,
    db_types::NewIdempotencyRecord,
    traits::IdempotencyStore,
    IdempotencyApi,
};
use futures::future::LocalBoxFuture;
use log::{debug, trace, warn};
use serde_json::{json, Value};

use crate::{
    errors::ServerError,
    helpers::{require_user_id, validate_idempotency_key, IDEMPOTENCY_KEY_HEADER},
};

pub const IDEMPOTENT_REPLAYED_HEADER: &str = "Idempotent-Replayed";

pub struct IdempotencyMiddlewareFactory<B: IdempotencyStore> {
    api: Arc<IdempotencyApi<B>>,
}

impl<B: IdempotencyStore> IdempotencyMiddlewareFactory<B> {
    pub fn new(api: Arc<IdempotencyApi<B>>) -> Self {
        Self { api }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdempotencyMiddlewareFactory<B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
    B: IdempotencyStore + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<BoxBody>;
    type Transform = IdempotencyMiddlewareService<S, B>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdempotencyMiddlewareService { api: Arc::clone(&self.api), service: Rc::new(service) }))
    }
}

pub struct IdempotencyMiddlewareService<S, B: IdempotencyStore> {
    api: Arc<IdempotencyApi<B>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IdempotencyMiddlewareService<S, B>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
    B: IdempotencyStore + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<BoxBody>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let api = Arc::clone(&self.api);
        Box::pin(async move {
            trace!("🔐️ Checking idempotency key for request");
            let user_id = require_user_id(req.request())?;
            let key = req
                .headers()
                .get(IDEMPOTENCY_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    ServerError::InvalidIdempotencyKey(format!("The {IDEMPOTENCY_KEY_HEADER} header is required"))
                })?;
            let key = validate_idempotency_key(&key)?;
            let endpoint = req.path().to_string();
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {e:?}");
                ServerError::InvalidRequestBody(e.to_string())
            })?;
            let fingerprint = body_fingerprint(&data);
            match api.fetch(&endpoint, &user_id, &key).await.map_err(ServerError::from)? {
                Some(record) if record.fingerprint == fingerprint => {
                    debug!("🔐️ Replaying stored response for {endpoint}:{user_id}:{key}");
                    let status = StatusCode::from_u16(record.response_status as u16)
                        .map_err(|e| ErrorInternalServerError(e.to_string()))?;
                    let mut builder = HttpResponse::build(status);
                    for (name, value) in header_pairs(&record.response_headers.0) {
                        builder.insert_header((name.as_str(), value.as_str()));
                    }
                    builder.insert_header((IDEMPOTENT_REPLAYED_HEADER, "true"));
                    let response = builder.body(record.response_body.clone());
                    return Ok(req.into_response(response));
                },
                Some(_) => {
                    debug!("🔐️ Idempotency key {key} reused with a different body on {endpoint}. Rejecting.");
                    return Err(ServerError::IdempotencyConflict.into());
                },
                None => {},
            }
            req.set_payload(bytes_to_payload(data));
            let res = service.call(req).await?;
            // Capture the handler's response so replays can return it verbatim.
            let (req, res) = res.into_parts();
            let res: Response<BoxBody> = res.into();
            let (head, res_body) = res.into_parts();
            let body_bytes = body::to_bytes(res_body).await.map_err(|e| {
                warn!("🔐️ Could not buffer response body for idempotent capture: {e:?}");
                ErrorInternalServerError("Could not buffer response body")
            })?;
            let record = NewIdempotencyRecord {
                endpoint,
                user_id,
                idem_key: key,
                fingerprint,
                response_status: head.status().as_u16() as i64,
                response_headers: headers_to_json(&head),
                response_body: body_bytes.to_vec(),
            };
            api.store(record).await.map_err(ServerError::from)?;
            let res = HttpResponse::from(head.set_body(body_bytes)).map_into_boxed_body();
            Ok(ServiceResponse::new(req, res))
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

fn headers_to_json(head: &Response<()>) -> Value {
    let pairs = head
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| json!([name.as_str(), v])))
        .collect::<Vec<_>>();
    Value::Array(pairs)
}

fn header_pairs(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| {
                    let name = pair.get(0)?.as_str()?;
                    let value = pair.get(1)?.as_str()?;
                    Some((name.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}
