//! Database module - SQLite connection and migrations

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Create database connection pool
///
/// File stores run in WAL mode so range queries are not blocked by appends.
/// In-memory stores live on a single connection that is never recycled,
/// otherwise the data would vanish with the connection.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    if in_memory {
        return SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await;
    }

    if let Some(parent) = Path::new(options.get_filename()).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    options = options.journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create tables if not exist
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Nodes (registered submitters, keyed by credential-derived id)
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    credential_fingerprint TEXT NOT NULL UNIQUE,
    display_name TEXT,
    latitude REAL,
    longitude REAL,
    last_seen TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Measurements (one row per capture window, append-only)
CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT NOT NULL REFERENCES nodes(id),
    timestamp TEXT NOT NULL,
    received_at TEXT NOT NULL,
    wifi_channel INTEGER,
    wifi_util_pct REAL,
    noise_dbm REAL,
    deauth_count INTEGER NOT NULL DEFAULT 0,
    disassoc_count INTEGER NOT NULL DEFAULT 0,
    local_wifi_signal_dbm REAL,
    local_wifi_noise_dbm REAL,
    rf_jam_detected INTEGER
);

-- Events (emitted by the detector, append-only)
CREATE TABLE IF NOT EXISTS events (
    id BLOB PRIMARY KEY,
    event_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    node_id TEXT NOT NULL REFERENCES nodes(id),
    measurement_id INTEGER NOT NULL REFERENCES measurements(id),
    description TEXT NOT NULL,
    metrics TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Per-channel amplitude samples from node channel scans
CREATE TABLE IF NOT EXISTS channel_amplitude (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id TEXT NOT NULL REFERENCES nodes(id),
    timestamp TEXT NOT NULL,
    channel INTEGER NOT NULL,
    signal_dbm REAL,
    noise_dbm REAL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_measurements_timestamp ON measurements(timestamp);
CREATE INDEX IF NOT EXISTS idx_measurements_node ON measurements(node_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_node ON events(node_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_channel_amplitude_timestamp ON channel_amplitude(timestamp);
"#;

/// Fresh migrated in-memory store for tests
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:", 1)
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("schema");
    pool
}
