use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crossflow_engine::{run_migrations, SqliteDatabase};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    apply_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://{}/crossflow_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn apply_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    run_migrations(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}
