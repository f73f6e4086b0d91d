//! Durable store for outages, subscriptions, and the provider directory
//!
//! The monitoring engine sees storage through the [`OutageStore`] trait, so
//! integration tests can swap in in-memory fakes. The shipping
//! implementation is SQLite behind a `Mutex<Connection>`; outage rows are
//! created at the new-outage transition, mutated in place while active, and
//! get their end time set exactly once. Rows are never deleted.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::PersistenceError;
use crate::models::{AddressKey, City, OutageRecord, Street};

/// Timestamp format for SQLite TEXT columns
const DB_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn to_db_time(time: Option<NaiveDateTime>) -> Option<String> {
    time.map(|t| t.format(DB_TIME_FORMAT).to_string())
}

/// Persistence contract used by the lifecycle engine and the scheduler
#[async_trait]
pub trait OutageStore: Send + Sync {
    /// Insert a new outage occurrence, returning the assigned row id
    async fn create_outage(&self, record: &OutageRecord) -> Result<i64, PersistenceError>;

    /// Overwrite the descriptive fields of an existing occurrence
    async fn update_outage(&self, record: &OutageRecord) -> Result<(), PersistenceError>;

    /// Set the end time of an occurrence (written once, at the ended transition)
    async fn set_outage_end(
        &self,
        outage_id: i64,
        end_time: NaiveDateTime,
    ) -> Result<(), PersistenceError>;

    /// Subscriber ids registered for an address (derived fresh on demand)
    async fn subscriber_ids(&self, key: AddressKey) -> Result<Vec<i64>, PersistenceError>;

    /// Distinct subscribed addresses with their provider district ids
    async fn monitored_addresses(
        &self,
    ) -> Result<Vec<(AddressKey, Option<i64>)>, PersistenceError>;

    /// Human-readable label for an address, from the local directory
    async fn address_label(&self, key: AddressKey) -> Result<String, PersistenceError>;

    /// Upsert a city directory row
    async fn upsert_city(&self, city: &City) -> Result<(), PersistenceError>;

    /// Upsert a street directory row for a city
    async fn upsert_street(&self, city_id: i64, street: &Street)
        -> Result<(), PersistenceError>;

    /// Register a subscriber for an address (idempotent)
    async fn add_subscription(
        &self,
        subscriber_id: i64,
        key: AddressKey,
    ) -> Result<(), PersistenceError>;

    /// Number of addresses a subscriber is registered for
    async fn subscription_count(&self, subscriber_id: i64) -> Result<usize, PersistenceError>;
}

/// SQLite implementation of [`OutageStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteOutageStore {
    conn: Mutex<Connection>,
}

impl SqliteOutageStore {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::NotFound(format!("db directory: {e}")))?;
        }

        let conn = Connection::open(path)?;
        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS city (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    district_id INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_city_name ON city(name);

                CREATE TABLE IF NOT EXISTS street (
                    id INTEGER NOT NULL,
                    city_id INTEGER NOT NULL REFERENCES city(id),
                    name TEXT NOT NULL,
                    PRIMARY KEY (id, city_id)
                );
                CREATE INDEX IF NOT EXISTS idx_street_name ON street(name);

                CREATE TABLE IF NOT EXISTS subscriber (
                    id INTEGER PRIMARY KEY,
                    started_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS address (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    city_id INTEGER NOT NULL,
                    street_id INTEGER NOT NULL,
                    house_num INTEGER NOT NULL,
                    subscriber_id INTEGER NOT NULL REFERENCES subscriber(id),
                    UNIQUE (city_id, street_id, house_num, subscriber_id)
                );

                CREATE TABLE IF NOT EXISTS outage (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    city_id INTEGER NOT NULL,
                    street_id INTEGER NOT NULL,
                    house_num INTEGER NOT NULL,
                    start_time TEXT,
                    end_time TEXT,
                    is_planned INTEGER NOT NULL DEFAULT 0,
                    incident_id INTEGER,
                    incident_source_code INTEGER,
                    incident_source_desc TEXT,
                    incident_status_code INTEGER,
                    incident_trouble_code INTEGER,
                    incident_trouble_desc TEXT,
                    delay_cause_code INTEGER,
                    delay_cause_desc TEXT,
                    crew_name TEXT,
                    crew_assigned_time TEXT,
                    restore_est TEXT
                );
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl OutageStore for SqliteOutageStore {
    async fn create_outage(&self, record: &OutageRecord) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
                INSERT INTO outage (
                    city_id, street_id, house_num, start_time, is_planned,
                    incident_id, incident_source_code, incident_source_desc,
                    incident_status_code, incident_trouble_code,
                    incident_trouble_desc, delay_cause_code, delay_cause_desc,
                    crew_name, crew_assigned_time, restore_est
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                record.key.city_id,
                record.key.street_id,
                record.key.house_num,
                to_db_time(record.start_time),
                record.is_planned,
                record.incident_id,
                record.source_code,
                record.source_desc,
                record.status_code,
                record.trouble_code,
                record.trouble_desc,
                record.delay_cause_code,
                record.delay_cause_desc,
                record.crew_name,
                to_db_time(record.crew_assigned_time),
                to_db_time(record.restore_estimate),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn update_outage(&self, record: &OutageRecord) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"
                UPDATE outage SET
                    start_time = ?1, is_planned = ?2, incident_id = ?3,
                    incident_source_code = ?4, incident_source_desc = ?5,
                    incident_status_code = ?6, incident_trouble_code = ?7,
                    incident_trouble_desc = ?8, delay_cause_code = ?9,
                    delay_cause_desc = ?10, crew_name = ?11,
                    crew_assigned_time = ?12, restore_est = ?13
                WHERE id = ?14
            "#,
            params![
                to_db_time(record.start_time),
                record.is_planned,
                record.incident_id,
                record.source_code,
                record.source_desc,
                record.status_code,
                record.trouble_code,
                record.trouble_desc,
                record.delay_cause_code,
                record.delay_cause_desc,
                record.crew_name,
                to_db_time(record.crew_assigned_time),
                to_db_time(record.restore_estimate),
                record.id,
            ],
        )?;
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("outage {}", record.id)));
        }
        Ok(())
    }

    async fn set_outage_end(
        &self,
        outage_id: i64,
        end_time: NaiveDateTime,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE outage SET end_time = ?1 WHERE id = ?2",
            params![end_time.format(DB_TIME_FORMAT).to_string(), outage_id],
        )?;
        if updated == 0 {
            return Err(PersistenceError::NotFound(format!("outage {outage_id}")));
        }
        Ok(())
    }

    async fn subscriber_ids(&self, key: AddressKey) -> Result<Vec<i64>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT subscriber_id FROM address
             WHERE city_id = ?1 AND street_id = ?2 AND house_num = ?3",
        )?;
        let ids = stmt
            .query_map(
                params![key.city_id, key.street_id, key.house_num],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    async fn monitored_addresses(
        &self,
    ) -> Result<Vec<(AddressKey, Option<i64>)>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT a.city_id, a.street_id, a.house_num, c.district_id
             FROM address a LEFT JOIN city c ON c.id = a.city_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    AddressKey::new(row.get(0)?, row.get(1)?, row.get(2)?),
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn address_label(&self, key: AddressKey) -> Result<String, PersistenceError> {
        let conn = self.conn.lock().unwrap();

        let street: Option<String> = conn
            .query_row(
                "SELECT name FROM street WHERE id = ?1 AND city_id = ?2",
                params![key.street_id, key.city_id],
                |row| row.get(0),
            )
            .optional()?;
        let city: Option<String> = conn
            .query_row(
                "SELECT name FROM city WHERE id = ?1",
                params![key.city_id],
                |row| row.get(0),
            )
            .optional()?;

        match (street, city) {
            (Some(street), Some(city)) => Ok(format!("{street} {}, {city}", key.house_num)),
            // directory not synced yet, fall back to raw ids
            _ => Ok(format!(
                "street {} house {}, city {}",
                key.street_id, key.house_num, key.city_id
            )),
        }
    }

    async fn upsert_city(&self, city: &City) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO city (id, name, district_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = ?2, district_id = ?3",
            params![city.id, city.name, city.district_id],
        )?;
        Ok(())
    }

    async fn upsert_street(
        &self,
        city_id: i64,
        street: &Street,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO street (id, city_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id, city_id) DO UPDATE SET name = ?3",
            params![street.id, city_id, street.name],
        )?;
        Ok(())
    }

    async fn add_subscription(
        &self,
        subscriber_id: i64,
        key: AddressKey,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO subscriber (id) VALUES (?1)",
            params![subscriber_id],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO address (city_id, street_id, house_num, subscriber_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.city_id, key.street_id, key.house_num, subscriber_id],
        )?;
        Ok(())
    }

    async fn subscription_count(&self, subscriber_id: i64) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM address WHERE subscriber_id = ?1",
            params![subscriber_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
