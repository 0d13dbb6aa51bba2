//! Endpoint tests for initiate/confirm: idempotent replay, conflict detection, key validation, quote expiry and
//! ownership scoping.

use actix_web::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    endpoint_tests::helpers::{call, get, init_app, json, post_json, sandbox_providers, test_db, ALICE, BOB},
    middleware::IDEMPOTENT_REPLAYED_HEADER,
};

fn initiate_body(amount: f64) -> serde_json::Value {
    json!({
        "amount": amount,
        "destination_currency": "MXN",
        "payment_method": "ach",
        "fee_handling": "inclusive",
    })
}

fn fresh_key() -> String {
    Uuid::new_v4().to_string()
}

#[actix_web::test]
async fn initiate_reserves_a_payment() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let (status, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&fresh_key()), &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&body);
    assert_eq!(response["status"], "INITIATED");
    assert!(response["payment_id"].as_str().map(|s| !s.is_empty()).unwrap_or(false));
    assert!(response["quote_expires_at"].is_string());
}

#[actix_web::test]
async fn replaying_an_initiate_returns_the_stored_response_verbatim() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let key = fresh_key();
    let body = initiate_body(100.0);
    let (status, _, first) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&key), &body)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, headers, second) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&key), &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second, "a replay must be byte-identical");
    assert_eq!(headers.get(IDEMPOTENT_REPLAYED_HEADER).map(|v| v.to_str().unwrap()), Some("true"));
    // Only one payment was created.
    let (_, _, listing) = call(&app, get("/api/v1/payments", Some(ALICE))).await;
    assert_eq!(json(&listing).as_array().map(|a| a.len()), Some(1));
}

#[actix_web::test]
async fn reusing_a_key_with_a_different_body_conflicts() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let key = fresh_key();
    let (status, _, _) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&key), &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&key), &initiate_body(200.0))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json(&body)["error"], "idempotency_conflict");
    // The original payment is unchanged and still alone.
    let (_, _, listing) = call(&app, get("/api/v1/payments", Some(ALICE))).await;
    let listing = json(&listing);
    assert_eq!(listing.as_array().map(|a| a.len()), Some(1));
    assert_eq!(listing[0]["amount"], 100.0);
}

#[actix_web::test]
async fn the_same_key_is_independent_across_users_and_endpoints() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let key = fresh_key();
    let (status, _, _) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&key), &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::OK);
    // Same key, same body, different user: a first request, not a replay.
    let (status, headers, _) = call(&app, post_json("/api/v1/initiate", Some(BOB), Some(&key), &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(IDEMPOTENT_REPLAYED_HEADER).is_none());
}

#[actix_web::test]
async fn idempotency_keys_must_be_uuid_v4() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let (status, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some("not-a-uuid"), &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_idempotency_key");
    let (status, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), None, &initiate_body(100.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_idempotency_key");
}

#[actix_web::test]
async fn confirm_moves_the_payment_to_processing() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let (_, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&fresh_key()), &initiate_body(100.0))).await;
    let payment_id = json(&body)["payment_id"].as_str().unwrap().to_string();
    let confirm = json!({ "payment_id": payment_id });
    let (status, _, body) = call(&app, post_json("/api/v1/confirm", Some(ALICE), Some(&fresh_key()), &confirm)).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&body);
    assert_eq!(response["status"], "CONFIRMED");
    assert_eq!(response["processing"], true);
}

#[actix_web::test]
async fn confirm_after_the_quote_lifetime_is_rejected() {
    let db = test_db().await;
    let app = init_app(db.clone(), sandbox_providers()).await;
    let (_, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&fresh_key()), &initiate_body(100.0))).await;
    let payment_id = json(&body)["payment_id"].as_str().unwrap().to_string();
    // Age the quote past its 60-second lifetime.
    sqlx::query("UPDATE payments SET quote_expires_at = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::seconds(1))
        .bind(&payment_id)
        .execute(db.pool())
        .await
        .unwrap();
    let confirm = json!({ "payment_id": payment_id });
    let (status, _, body) = call(&app, post_json("/api/v1/confirm", Some(ALICE), Some(&fresh_key()), &confirm)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "quote_expired");
    // The payment stays INITIATED and no work was queued.
    let (_, _, payment) = call(&app, get(&format!("/api/v1/payments/{payment_id}"), Some(ALICE))).await;
    assert_eq!(json(&payment)["status"], "INITIATED");
    let (queued,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE kind = 'payment-processing'")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(queued, 0);
}

#[actix_web::test]
async fn payments_are_scoped_to_their_owner() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let (_, _, body) = call(&app, post_json("/api/v1/initiate", Some(ALICE), Some(&fresh_key()), &initiate_body(100.0))).await;
    let payment_id = json(&body)["payment_id"].as_str().unwrap().to_string();
    let (status, _, _) = call(&app, get(&format!("/api/v1/payments/{payment_id}"), Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = call(&app, get(&format!("/api/v1/payments/{payment_id}"), Some(BOB))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn event_streams_404_for_unknown_payments() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let (status, _, body) = call(&app, get("/api/v1/events/does-not-exist", Some(ALICE))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "not_found");
}
