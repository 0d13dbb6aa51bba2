pub mod db;
mod sqlite_impl;

pub use db::run_migrations;
pub use sqlite_impl::SqliteDatabase;
