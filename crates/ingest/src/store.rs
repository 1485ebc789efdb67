//! Durable event archive keyed by line fingerprint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

use licarch_core::{Action, LicenseEvent, ParsedEvent};

/// Written to `meta` on first open.
pub const SCHEMA_VERSION: &str = "1.0";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error().map(|d| d.kind()) {
            Some(
                ErrorKind::UniqueViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
                | ErrorKind::ForeignKeyViolation,
            ) => StoreError::ConstraintViolation(e.to_string()),
            _ => StoreError::Database(e),
        }
    }
}

/// Row-oriented persistence with a uniqueness constraint on the fingerprint.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert events, silently skipping fingerprints already present.
    /// Returns how many rows were actually added.
    async fn insert_batch(&self, events: &[ParsedEvent]) -> Result<u64, StoreError>;

    /// Total archived rows.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Whether re-inserting a known fingerprint is guaranteed to be a no-op.
    /// Force-reprocessing is only safe against stores that return `true`.
    fn deduplicates(&self) -> bool;
}

/// SQLite archive.
///
/// ```text
/// meta(schema_version)
/// logs(id, timestamp, log_level, component, action, license_type,
///      user_name, client_ip, raw_message, raw_hash UNIQUE)
/// idx_logs_timestamp ON logs(timestamp)
/// ```
pub struct SqliteEventStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteEventStore {
    /// Open (creating file, parent directories and schema as needed).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        // One writer per run; the pipeline is strictly sequential.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;

        // A file that is not a SQLite database only fails once it is read.
        let store = Self { pool, path };
        store
            .init_schema()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", store.path.display())))?;
        info!(path = %store.path.display(), "Event store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS meta (schema_version TEXT NOT NULL)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                log_level TEXT NOT NULL,
                component TEXT NOT NULL,
                action TEXT NOT NULL,
                license_type TEXT NOT NULL,
                user_name TEXT NOT NULL,
                client_ip TEXT NOT NULL,
                raw_message TEXT NOT NULL,
                raw_hash TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp)")
            .execute(&mut *tx)
            .await?;

        let markers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM meta")
            .fetch_one(&mut *tx)
            .await?;
        if markers == 0 {
            sqlx::query("INSERT INTO meta (schema_version) VALUES (?1)")
                .bind(SCHEMA_VERSION)
                .execute(&mut *tx)
                .await?;
            debug!(version = SCHEMA_VERSION, "Wrote schema version marker");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Underlying pool, for ad-hoc analytics queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn schema_version(&self) -> Result<Option<String>, StoreError> {
        let version: Option<String> = sqlx::query_scalar("SELECT schema_version FROM meta LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(version)
    }

    pub async fn contains(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let hits: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs WHERE raw_hash = ?1")
            .bind(fingerprint)
            .fetch_one(&self.pool)
            .await?;
        Ok(hits > 0)
    }

    /// Events with `from <= timestamp <= to`, oldest first.
    ///
    /// Vendor timestamps are fixed-width `YYYY/MM/DD HH:MM:SS:mmm`, so text
    /// order is chronological and the timestamp index serves the scan.
    pub async fn events_between(&self, from: &str, to: &str) -> Result<Vec<LicenseEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, log_level, component, action, license_type,
                   user_name, client_ip, raw_message
            FROM logs
            WHERE timestamp >= ?1 AND timestamp <= ?2
            ORDER BY timestamp, id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<LicenseEvent, sqlx::Error> {
                let action: String = row.try_get("action")?;
                let action: Action = action
                    .parse()
                    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                Ok(LicenseEvent {
                    timestamp: row.try_get("timestamp")?,
                    log_level: row.try_get("log_level")?,
                    component: row.try_get("component")?,
                    action,
                    license_type: row.try_get("license_type")?,
                    user_name: row.try_get("user_name")?,
                    client_ip: row.try_get("client_ip")?,
                    raw_message: row.try_get("raw_message")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert_batch(&self, events: &[ParsedEvent]) -> Result<u64, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for parsed in events {
            let e = &parsed.event;
            // Only a fingerprint conflict is absorbed; any other constraint still fails.
            let result = sqlx::query(
                r#"
                INSERT INTO logs
                    (timestamp, log_level, component, action, license_type,
                     user_name, client_ip, raw_message, raw_hash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(raw_hash) DO NOTHING
                "#,
            )
            .bind(&e.timestamp)
            .bind(&e.log_level)
            .bind(&e.component)
            .bind(e.action.as_str())
            .bind(&e.license_type)
            .bind(&e.user_name)
            .bind(&e.client_ip)
            .bind(&e.raw_message)
            .bind(parsed.fingerprint())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(attempted = events.len(), inserted, "Batch insert committed");
        Ok(inserted)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(rows as u64)
    }

    fn deduplicates(&self) -> bool {
        true
    }
}
