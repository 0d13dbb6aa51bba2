use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, Payment, PaymentId, PaymentStatus, TransitionChanges},
    traits::PaymentStoreError,
};

/// Inserts a new payment row with status `INITIATED`. This is not atomic on its own; callers embed it in a
/// transaction together with the event and webhook outbox writes.
pub async fn insert_payment(
    payment: NewPayment,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, PaymentStoreError> {
    let quote_id = payment.quote_id.clone();
    let inserted: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                id,
                user_id,
                destination_currency,
                amount,
                payment_method,
                fee_handling,
                onramp_fee,
                corridor_fee,
                platform_fee,
                network_gas_fee,
                total_fees,
                usdc_sent,
                exchange_rate,
                destination_amount,
                quote_id,
                quote_expires_at,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
            RETURNING *;
        "#,
    )
    .bind(payment.id)
    .bind(payment.user_id)
    .bind(payment.destination_currency)
    .bind(payment.amount)
    .bind(payment.payment_method)
    .bind(payment.fee_handling)
    .bind(payment.onramp_fee)
    .bind(payment.corridor_fee)
    .bind(payment.platform_fee)
    .bind(payment.network_gas_fee)
    .bind(payment.total_fees)
    .bind(payment.usdc_sent)
    .bind(payment.exchange_rate)
    .bind(payment.destination_amount)
    .bind(payment.quote_id)
    .bind(payment.quote_expires_at)
    .bind(PaymentStatus::Initiated)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            PaymentStoreError::DuplicateQuote(quote_id.unwrap_or_default())
        },
        _ => PaymentStoreError::from(e),
    })?;
    debug!("📝️ Payment [{}] inserted", inserted.id);
    Ok(inserted)
}

pub async fn fetch_payment(
    id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, PaymentStoreError> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(payment)
}

/// Returns all payments for a user, newest first.
pub async fn fetch_payments_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, PaymentStoreError> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Writes the new status and the columns carried by `changes`. `completed_at` is set iff the new status is terminal.
/// The caller has already validated the transition against the state machine.
pub(crate) async fn update_status(
    id: &PaymentId,
    new_status: PaymentStatus,
    changes: &TransitionChanges,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, PaymentStoreError> {
    let completed_at = new_status.is_terminal().then_some(now);
    let payment: Option<Payment> = sqlx::query_as(
        r#"
            UPDATE payments SET
                status = $1,
                onramp_tx_id = COALESCE($2, onramp_tx_id),
                offramp_tx_id = COALESCE($3, offramp_tx_id),
                completed_at = $4,
                updated_at = $5
            WHERE id = $6 RETURNING *
        "#,
    )
    .bind(new_status)
    .bind(&changes.onramp_tx_id)
    .bind(&changes.offramp_tx_id)
    .bind(completed_at)
    .bind(now)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    payment.ok_or_else(|| PaymentStoreError::PaymentNotFound(id.clone()))
}
