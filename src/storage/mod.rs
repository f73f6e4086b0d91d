//! Database operations (SQLite)

pub mod repository;

pub use repository::{OutageStore, SqliteOutageStore};
