//! Endpoint tests for `POST /api/v1/quote` against the sandbox rate table (MXN 17.234, NGN 745.50).

use actix_web::http::StatusCode;
use serde_json::json;

use crate::endpoint_tests::helpers::{call, init_app, json, post_json, sandbox_providers, test_db};

#[actix_web::test]
async fn ach_mxn_inclusive_quote_breaks_down_fees() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let body = json!({
        "amount": 100,
        "destination_currency": "MXN",
        "payment_method": "ach",
        "fee_handling": "inclusive",
    });
    let (status, _, body) = call(&app, post_json("/api/v1/quote", None, None, &body)).await;
    assert_eq!(status, StatusCode::OK);
    let quote = json(&body);
    assert_eq!(quote["exchange_rate"], 17.234);
    assert_eq!(quote["breakdown"]["input_amount"], 100.0);
    assert_eq!(quote["breakdown"]["fees"]["onramp"], 0.0);
    assert_eq!(quote["breakdown"]["fees"]["corridor"], 1.0);
    assert_eq!(quote["breakdown"]["fees"]["platform"], 3.49);
    assert_eq!(quote["breakdown"]["fees"]["network_gas"], 0.05);
    assert_eq!(quote["breakdown"]["fees"]["total"], 4.54);
    assert_eq!(quote["breakdown"]["usdc_sent"], 95.46);
    // 95.46 USDC at 17.234 MXN/USD, rounded to the destination cent
    assert_eq!(quote["breakdown"]["destination_amount"], 1645.16);
    assert_eq!(quote["breakdown"]["effective_rate"], 16.4516);
    assert_eq!(quote["margin"], 4.54);
    assert!(quote["quote_id"].as_str().map(|s| !s.is_empty()).unwrap_or(false));
    assert!(quote["expires_at"].is_string());
}

#[actix_web::test]
async fn card_ngn_additive_quote_charges_fees_on_top() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let body = json!({
        "amount": 500,
        "destination_currency": "NGN",
        "payment_method": "card",
        "fee_handling": "additive",
    });
    let (status, _, body) = call(&app, post_json("/api/v1/quote", None, None, &body)).await;
    assert_eq!(status, StatusCode::OK);
    let quote = json(&body);
    assert_eq!(quote["breakdown"]["fees"]["onramp"], 14.5);
    assert_eq!(quote["breakdown"]["fees"]["corridor"], 10.0);
    assert_eq!(quote["breakdown"]["fees"]["platform"], 5.49);
    assert_eq!(quote["breakdown"]["fees"]["network_gas"], 0.05);
    assert_eq!(quote["breakdown"]["fees"]["total"], 30.04);
    assert_eq!(quote["breakdown"]["usdc_sent"], 500.0);
    assert_eq!(quote["breakdown"]["destination_amount"], 372_750.0);
}

#[actix_web::test]
async fn amounts_outside_the_bounds_are_rejected() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    for amount in [9.99, 10_000.01] {
        let body = json!({
            "amount": amount,
            "destination_currency": "MXN",
            "payment_method": "ach",
            "fee_handling": "inclusive",
        });
        let (status, _, body) = call(&app, post_json("/api/v1/quote", None, None, &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount} must be rejected");
        assert_eq!(json(&body)["error"], "invalid_input");
    }
    // The bounds themselves are inclusive.
    for amount in [10.00, 10_000.00] {
        let body = json!({
            "amount": amount,
            "destination_currency": "MXN",
            "payment_method": "ach",
            "fee_handling": "inclusive",
        });
        let (status, _, _) = call(&app, post_json("/api/v1/quote", None, None, &body)).await;
        assert_eq!(status, StatusCode::OK, "amount {amount} must be accepted");
    }
}

#[actix_web::test]
async fn unknown_corridors_are_rejected() {
    let app = init_app(test_db().await, sandbox_providers()).await;
    let body = json!({
        "amount": 100,
        "destination_currency": "EUR",
        "payment_method": "ach",
        "fee_handling": "inclusive",
    });
    let (status, _, body) = call(&app, post_json("/api/v1/quote", None, None, &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_input");
}
