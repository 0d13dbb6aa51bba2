use cfp_common::Rate;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Corridor, ExchangeRateEntry},
    traits::RateError,
};

/// The most recent observation for a corridor, if one has ever been recorded.
pub async fn fetch_last_rate(
    corridor: Corridor,
    conn: &mut SqliteConnection,
) -> Result<Option<ExchangeRateEntry>, RateError> {
    let entry = sqlx::query_as(
        r#"SELECT currency, rate, updated_at FROM exchange_rates
           WHERE currency = $1 ORDER BY updated_at DESC, id DESC LIMIT 1"#,
    )
    .bind(corridor)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

/// Appends a fresh observation. History is kept; readers only ever look at the newest row.
pub async fn set_exchange_rate(
    corridor: Corridor,
    rate: Rate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), RateError> {
    sqlx::query("INSERT INTO exchange_rates (currency, rate, updated_at) VALUES ($1, $2, $3)")
        .bind(corridor)
        .bind(rate)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}
