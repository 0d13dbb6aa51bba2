use crossflow_engine::{IdempotencyApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the idempotency-record purge worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_purge_worker(db: SqliteDatabase) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = IdempotencyApi::new(db);
        info!("🕰️ Idempotency purge worker started");
        loop {
            timer.tick().await;
            match api.purge_expired().await {
                Ok(0) => trace!("🕰️ No expired idempotency records to purge"),
                Ok(purged) => info!("🕰️ {purged} expired idempotency records purged"),
                Err(e) => error!("🕰️ Error purging idempotency records: {e}"),
            }
        }
    })
}
