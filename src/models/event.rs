//! Event model - the append-only event log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::measurement::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventType {
    DeauthBurst,
    DisassocBurst,
    RfJamming,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DeauthBurst => "deauth_burst",
            EventType::DisassocBurst => "disassoc_burst",
            EventType::RfJamming => "rf_jamming",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Severity {
    Moderate,
    Severe,
    Critical,
}

/// Event produced by the detector, not yet logged
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub metrics: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub measurement_id: i64,
    pub description: String,
    pub metrics: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub async fn append(
        pool: &SqlitePool,
        node_id: &str,
        measurement_id: i64,
        data: &NewEvent,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, event_type, severity, timestamp, node_id, measurement_id, description, metrics, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(data.event_type)
        .bind(data.severity)
        .bind(data.timestamp)
        .bind(node_id)
        .bind(measurement_id)
        .bind(&data.description)
        .bind(Json(&data.metrics))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Events in `range`, ascending by timestamp then log order.
    pub async fn range(
        pool: &SqlitePool,
        range: TimeRange,
        node_id: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE timestamp >= ?1 AND timestamp <= ?2
              AND (?3 IS NULL OR node_id = ?3)
            ORDER BY timestamp ASC, rowid ASC
            "#
        )
        .bind(range.start)
        .bind(range.end)
        .bind(node_id)
        .fetch_all(pool)
        .await
    }
}
