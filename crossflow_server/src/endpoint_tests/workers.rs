//! Tests of the orchestration handler: the full onramp/offramp drive, sticky failure handling, and idempotent
//! redelivery.

use std::time::Duration;

use cfp_common::Usd;
use chrono::Utc;
use crossflow_engine::{
    db_types::{Corridor, FeeHandling, NewPayment, PaymentId, PaymentMethod, PaymentStatus},
    fees,
    providers::{fallback_rate, SandboxOfframp, SandboxOnramp},
    PaymentFlowApi,
    SqliteDatabase,
};
use serde_json::json;

use crate::{endpoint_tests::helpers::test_db, workers::process_payment};

const TIMEOUT: Duration = Duration::from_secs(5);

fn priced_payment(user_id: &str) -> NewPayment {
    let amount = Usd::from_dollars(100);
    let summary = fees::calculate(amount, PaymentMethod::Ach, Corridor::Mxn, FeeHandling::Inclusive).unwrap();
    let rate = fallback_rate(Corridor::Mxn);
    NewPayment {
        id: PaymentId::random(),
        user_id: user_id.to_string(),
        destination_currency: Corridor::Mxn,
        amount,
        payment_method: PaymentMethod::Ach,
        fee_handling: FeeHandling::Inclusive,
        onramp_fee: summary.fees.onramp,
        corridor_fee: summary.fees.corridor,
        platform_fee: summary.fees.platform,
        network_gas_fee: summary.fees.network_gas,
        total_fees: summary.fees.total,
        usdc_sent: summary.usdc_sent,
        exchange_rate: rate,
        destination_amount: rate.convert(summary.usdc_sent),
        quote_id: None,
        quote_expires_at: Utc::now() + chrono::Duration::seconds(60),
    }
}

async fn confirmed_payment(db: &SqliteDatabase) -> (PaymentFlowApi<SqliteDatabase>, PaymentId) {
    let flow = PaymentFlowApi::new(db.clone());
    let payment = flow.initiate(priced_payment("worker_user")).await.unwrap();
    flow.confirm(&payment.id).await.unwrap();
    (flow, payment.id)
}

#[actix_web::test]
async fn the_orchestrator_drives_a_payment_to_completion() {
    let db = test_db().await;
    let (flow, id) = confirmed_payment(&db).await;
    let onramp = SandboxOnramp::default();
    let offramp = SandboxOfframp::default();

    process_payment(&flow, &onramp, &offramp, &id, TIMEOUT).await.expect("Processing should succeed");

    let payment = flow.payment(&id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.completed_at.is_some());
    assert!(payment.onramp_tx_id.is_some());
    assert!(payment.offramp_tx_id.is_some());
    let types = flow
        .events_for_payment(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect::<Vec<_>>();
    assert_eq!(types, vec![
        "payment.initiated",
        "payment.confirmed",
        "onramp.pending",
        "onramp.completed",
        "offramp.pending",
        "offramp.completed",
        "payment.completed",
    ]);
}

#[actix_web::test]
async fn an_onramp_failure_is_terminal_and_skips_the_offramp() {
    let db = test_db().await;
    let (flow, id) = confirmed_payment(&db).await;
    let onramp = SandboxOnramp::failing("card declined");
    let offramp = SandboxOfframp::default();

    let result = process_payment(&flow, &onramp, &offramp, &id, TIMEOUT).await;
    assert!(result.is_err(), "the error must be re-raised so the queue counts the attempt");

    let payment = flow.payment(&id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    let events = flow.events_for_payment(&id).await.unwrap();
    let types = events.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>();
    assert_eq!(types, vec![
        "payment.initiated",
        "payment.confirmed",
        "onramp.pending",
        "onramp.failed",
        "payment.failed",
    ]);
    // The failure reason is carried on the onramp.failed event.
    let failed = events.iter().find(|e| e.event_type == "onramp.failed").unwrap();
    assert_eq!(failed.metadata.0, json!({ "error": "sandbox onramp rejected the request. card declined" }));

    // Redelivery of the job is a no-op: failure substates are sticky.
    process_payment(&flow, &onramp, &offramp, &id, TIMEOUT).await.expect("Redelivery must succeed quietly");
    assert_eq!(flow.events_for_payment(&id).await.unwrap().len(), 5);
}

#[actix_web::test]
async fn redelivery_after_completion_changes_nothing() {
    let db = test_db().await;
    let (flow, id) = confirmed_payment(&db).await;
    let onramp = SandboxOnramp::default();
    let offramp = SandboxOfframp::default();
    process_payment(&flow, &onramp, &offramp, &id, TIMEOUT).await.unwrap();
    let before = flow.events_for_payment(&id).await.unwrap().len();
    process_payment(&flow, &onramp, &offramp, &id, TIMEOUT).await.unwrap();
    assert_eq!(flow.events_for_payment(&id).await.unwrap().len(), before);
}
