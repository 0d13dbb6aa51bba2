//! End-to-end tests of the payment state machine against the SQLite backend: the transactional outbox (status +
//! event + webhook delivery + job), transition guards, quote expiry and the per-user event feed.

use cfp_common::Usd;
use chrono::{Duration, Utc};
use crossflow_engine::{
    db_types::{Corridor, FeeHandling, JobKind, PaymentMethod, PaymentStatus, TransitionChanges},
    traits::{JobQueue, PaymentStore},
    PaymentFlowApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::support::{
    payments::new_payment,
    prepare_env::{prepare_test_env, random_db_path},
};

mod support;

async fn setup() -> PaymentFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    PaymentFlowApi::new(db)
}

async fn tear_down(mut api: PaymentFlowApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        eprintln!("Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

#[tokio::test]
async fn happy_path_emits_the_full_event_sequence() {
    let api = setup().await;
    let new = new_payment("alice", Usd::from_dollars(100), PaymentMethod::Ach, Corridor::Mxn, FeeHandling::Inclusive);
    let payment = api.initiate(new).await.expect("Error initiating payment");
    assert_eq!(payment.status, PaymentStatus::Initiated);
    assert_eq!(payment.usdc_sent + payment.total_fees, payment.amount);
    assert!(payment.completed_at.is_none());

    api.confirm(&payment.id).await.expect("Error confirming payment");
    // Confirm queues exactly one processing job, atomically with the status write.
    let jobs = api.db().dequeue_jobs(JobKind::PaymentProcessing, 10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload.0["payment_id"], payment.id.as_str());

    let id = &payment.id;
    let changes = TransitionChanges { onramp_tx_id: Some("onramp_tx_1".into()), ..Default::default() };
    api.transition(id, PaymentStatus::OnrampPending, TransitionChanges::default()).await.unwrap();
    api.transition(id, PaymentStatus::OnrampCompleted, changes).await.unwrap();
    api.transition(id, PaymentStatus::OfframpPending, TransitionChanges::default()).await.unwrap();
    let changes = TransitionChanges { offramp_tx_id: Some("offramp_tx_1".into()), ..Default::default() };
    api.transition(id, PaymentStatus::OfframpCompleted, changes).await.unwrap();
    let done = api.transition(id, PaymentStatus::Completed, TransitionChanges::default()).await.unwrap();

    assert_eq!(done.status, PaymentStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!(done.onramp_tx_id.as_deref(), Some("onramp_tx_1"));
    assert_eq!(done.offramp_tx_id.as_deref(), Some("offramp_tx_1"));

    let events = api.events_for_payment(id).await.unwrap();
    let types = events.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>();
    assert_eq!(types, vec![
        "payment.initiated",
        "payment.confirmed",
        "onramp.pending",
        "onramp.completed",
        "offramp.pending",
        "offramp.completed",
        "payment.completed",
    ]);
    // Events are totally ordered and timestamps never move backwards.
    for window in events.windows(2) {
        assert!(window[0].id < window[1].id);
        assert!(window[0].timestamp <= window[1].timestamp);
    }
    // Every event froze a webhook delivery, and a delivery job for each is queued.
    let (deliveries,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM webhook_deliveries WHERE payment_id = $1")
        .bind(id.as_str())
        .fetch_one(api.db().pool())
        .await
        .unwrap();
    assert_eq!(deliveries as usize, events.len());
    let webhook_jobs = api.db().dequeue_jobs(JobKind::WebhookDelivery, 50).await.unwrap();
    assert_eq!(webhook_jobs.len(), events.len());
    tear_down(api).await;
}

#[tokio::test]
async fn illegal_transitions_do_not_mutate() {
    let api = setup().await;
    let new = new_payment("bob", Usd::from_dollars(50), PaymentMethod::Card, Corridor::Ngn, FeeHandling::Additive);
    let payment = api.initiate(new).await.unwrap();
    // Skipping CONFIRMED is not allowed.
    let err = api.transition(&payment.id, PaymentStatus::OnrampPending, TransitionChanges::default()).await;
    assert!(err.is_err());
    let unchanged = api.payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Initiated);
    assert_eq!(unchanged.updated_at, payment.updated_at);
    let events = api.events_for_payment(&payment.id).await.unwrap();
    assert_eq!(events.len(), 1, "a rejected transition must not append events");
    tear_down(api).await;
}

#[tokio::test]
async fn expired_quotes_cannot_be_confirmed() {
    let api = setup().await;
    let mut new = new_payment("carol", Usd::from_dollars(25), PaymentMethod::Ach, Corridor::Php, FeeHandling::Inclusive);
    new.quote_expires_at = Utc::now() - Duration::seconds(1);
    let payment = api.initiate(new).await.unwrap();
    let err = api.confirm(&payment.id).await;
    assert!(matches!(
        err,
        Err(crossflow_engine::cfe_api::payment_flow_api::PaymentFlowError::QuoteExpired(_))
    ));
    let unchanged = api.payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, PaymentStatus::Initiated);
    // No processing work was queued.
    let jobs = api.db().dequeue_jobs(JobKind::PaymentProcessing, 10).await.unwrap();
    assert!(jobs.is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn quote_ids_are_unique() {
    let api = setup().await;
    let first = new_payment("dave", Usd::from_dollars(75), PaymentMethod::Ach, Corridor::Inr, FeeHandling::Inclusive);
    let mut second =
        new_payment("dave", Usd::from_dollars(75), PaymentMethod::Ach, Corridor::Inr, FeeHandling::Inclusive);
    second.quote_id = first.quote_id.clone();
    api.initiate(first).await.unwrap();
    let err = api.initiate(second).await;
    assert!(err.is_err(), "a second payment for the same quote must be rejected");
    tear_down(api).await;
}

#[tokio::test]
async fn user_event_feed_spans_all_their_payments() {
    let api = setup().await;
    let p1 = api
        .initiate(new_payment("erin", Usd::from_dollars(20), PaymentMethod::Ach, Corridor::Brl, FeeHandling::Inclusive))
        .await
        .unwrap();
    let p2 = api
        .initiate(new_payment("erin", Usd::from_dollars(30), PaymentMethod::Card, Corridor::Mxn, FeeHandling::Additive))
        .await
        .unwrap();
    api.initiate(new_payment("frank", Usd::from_dollars(40), PaymentMethod::Ach, Corridor::Mxn, FeeHandling::Inclusive))
        .await
        .unwrap();
    api.confirm(&p2.id).await.unwrap();

    let events = api.user_events("erin").await.unwrap();
    // Newest first: p2's confirmation, then p2's initiation, then p1's.
    assert_eq!(events.len(), 3);
    assert!(events.windows(2).all(|w| w[0].id > w[1].id));
    assert_eq!(events[0].payment_id, p2.id);
    assert_eq!(events[0].event_type, "payment.confirmed");
    assert_eq!(events[2].payment_id, p1.id);

    // Tailing after the newest id yields only what happens afterwards.
    let watermark = events[0].id;
    api.confirm(&p1.id).await.unwrap();
    let fresh = api.user_events_after("erin", watermark).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].payment_id, p1.id);
    tear_down(api).await;
}
