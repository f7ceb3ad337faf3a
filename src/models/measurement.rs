//! Measurement model - the append-only time series

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use validator::Validate;

use super::metrics::Metric;

/// One stored capture-window sample
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Measurement {
    pub id: i64,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub wifi_channel: Option<i64>,
    pub wifi_util_pct: Option<f64>,
    pub noise_dbm: Option<f64>,
    pub deauth_count: i64,
    pub disassoc_count: i64,
    pub local_wifi_signal_dbm: Option<f64>,
    pub local_wifi_noise_dbm: Option<f64>,
    pub rf_jam_detected: Option<bool>,
}

/// Validated, normalized measurement ready to append
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMeasurement {
    pub timestamp: DateTime<Utc>,
    pub wifi_channel: Option<i64>,
    pub wifi_util_pct: Option<f64>,
    pub noise_dbm: Option<f64>,
    pub deauth_count: i64,
    pub disassoc_count: i64,
    pub local_wifi_signal_dbm: Option<f64>,
    pub local_wifi_noise_dbm: Option<f64>,
    pub rf_jam_detected: Option<bool>,
}

/// `POST /api/measurements` body. Every field is optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct MeasurementSubmission {
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default, alias = "name")]
    #[validate(length(max = 128))]
    pub node_name: Option<String>,

    #[serde(default, alias = "node_latitude")]
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,

    #[serde(default, alias = "node_longitude")]
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub wifi_channel: Option<i64>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub wifi_util_pct: Option<f64>,

    #[serde(default)]
    pub noise_dbm: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub deauth_count: Option<i64>,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub disassoc_count: Option<i64>,

    #[serde(default)]
    pub local_wifi_signal_dbm: Option<f64>,

    #[serde(default)]
    pub local_wifi_noise_dbm: Option<f64>,

    #[serde(default)]
    pub rf_jam_detected: Option<JamFlag>,
}

/// Collectors send the jam flag either as 0/1 or as a JSON boolean.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JamFlag {
    Bool(bool),
    Int(i64),
}

impl JamFlag {
    pub fn to_bool(self) -> Option<bool> {
        match self {
            JamFlag::Bool(b) => Some(b),
            JamFlag::Int(0) => Some(false),
            JamFlag::Int(1) => Some(true),
            JamFlag::Int(_) => None,
        }
    }
}

/// Inclusive time window for range queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Min / max stored measurement timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRange {
    pub min_timestamp: DateTime<Utc>,
    pub max_timestamp: DateTime<Utc>,
}

/// Parse an absolute instant. Offset-less ISO timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl Measurement {
    /// Value of one RF metric; `None` means unknown, not zero.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::WifiChannel => self.wifi_channel.map(|v| v as f64),
            Metric::WifiUtilPct => self.wifi_util_pct,
            Metric::NoiseDbm => self.noise_dbm,
            Metric::DeauthCount => Some(self.deauth_count as f64),
            Metric::DisassocCount => Some(self.disassoc_count as f64),
            Metric::LocalWifiSignalDbm => self.local_wifi_signal_dbm,
            Metric::LocalWifiNoiseDbm => self.local_wifi_noise_dbm,
            Metric::RfJamDetected => self.rf_jam_detected.map(|j| if j { 1.0 } else { 0.0 }),
        }
    }

    pub async fn insert<'e, E>(
        executor: E,
        node_id: &str,
        data: &NewMeasurement,
        received_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Measurement>(
            r#"
            INSERT INTO measurements (
                node_id, timestamp, received_at, wifi_channel, wifi_util_pct, noise_dbm,
                deauth_count, disassoc_count, local_wifi_signal_dbm, local_wifi_noise_dbm, rf_jam_detected
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#
        )
        .bind(node_id)
        .bind(data.timestamp)
        .bind(received_at)
        .bind(data.wifi_channel)
        .bind(data.wifi_util_pct)
        .bind(data.noise_dbm)
        .bind(data.deauth_count)
        .bind(data.disassoc_count)
        .bind(data.local_wifi_signal_dbm)
        .bind(data.local_wifi_noise_dbm)
        .bind(data.rf_jam_detected)
        .fetch_one(executor)
        .await
    }

    /// Measurements in `range`, ascending by timestamp then arrival.
    pub async fn range(
        pool: &SqlitePool,
        range: TimeRange,
        node_id: Option<&str>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM measurements
            WHERE timestamp >= ?1 AND timestamp <= ?2
              AND (?3 IS NULL OR node_id = ?3)
            ORDER BY timestamp ASC, id ASC
            "#
        )
        .bind(range.start)
        .bind(range.end)
        .bind(node_id)
        .fetch_all(pool)
        .await
    }

    pub async fn data_range(pool: &SqlitePool) -> Result<Option<DataRange>, sqlx::Error> {
        let min = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT timestamp FROM measurements ORDER BY timestamp ASC LIMIT 1"
        )
        .fetch_optional(pool)
        .await?;
        let max = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT timestamp FROM measurements ORDER BY timestamp DESC LIMIT 1"
        )
        .fetch_optional(pool)
        .await?;

        Ok(match (min, max) {
            (Some(min_timestamp), Some(max_timestamp)) => Some(DataRange {
                min_timestamp,
                max_timestamp,
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{Node, NodeIdentity, NodeUpdate};
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn node(pool: &SqlitePool, key: &str) -> String {
        Node::resolve_or_create(pool, &NodeIdentity::derive(key), &NodeUpdate::default(), Utc::now())
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn sample(ts: DateTime<Utc>) -> NewMeasurement {
        NewMeasurement {
            timestamp: ts,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 12:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01T12:30:00.250"),
            Some(expected + Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01T00:00:00Z"), None);
    }

    #[test]
    fn test_jam_flag_values() {
        assert_eq!(JamFlag::Int(1).to_bool(), Some(true));
        assert_eq!(JamFlag::Int(0).to_bool(), Some(false));
        assert_eq!(JamFlag::Bool(true).to_bool(), Some(true));
        assert_eq!(JamFlag::Int(2).to_bool(), None);
    }

    #[test]
    fn test_submission_aliases_and_validation() {
        let sub: MeasurementSubmission = serde_json::from_str(
            r#"{"name": "Attic", "node_latitude": 10.5, "rf_jam_detected": true}"#,
        )
        .unwrap();
        assert_eq!(sub.node_name.as_deref(), Some("Attic"));
        assert_eq!(sub.latitude, Some(10.5));
        assert_eq!(sub.rf_jam_detected, Some(JamFlag::Bool(true)));
        assert!(sub.validate().is_ok());

        let sub: MeasurementSubmission =
            serde_json::from_str(r#"{"deauth_count": -1}"#).unwrap();
        assert!(sub.validate().is_err());

        let sub: MeasurementSubmission = serde_json::from_str(r#"{"latitude": 91.0}"#).unwrap();
        assert!(sub.validate().is_err());

        let sub: MeasurementSubmission = serde_json::from_str(r#"{"wifi_util_pct": 140}"#).unwrap();
        assert!(sub.validate().is_err());
    }

    #[tokio::test]
    async fn test_range_sorted_by_timestamp_not_arrival() {
        let pool = test_pool().await;
        let node_id = node(&pool, "k1").await;

        Measurement::insert(&pool, &node_id, &sample(at(10)), Utc::now()).await.unwrap();
        Measurement::insert(&pool, &node_id, &sample(at(5)), Utc::now()).await.unwrap();

        let rows = Measurement::range(&pool, TimeRange { start: at(0), end: at(100) }, None)
            .await
            .unwrap();
        let stamps: Vec<_> = rows.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![at(5), at(10)]);
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive_and_filter_node() {
        let pool = test_pool().await;
        let a = node(&pool, "k1").await;
        let b = node(&pool, "k2").await;

        for secs in [0, 50, 100, 150] {
            Measurement::insert(&pool, &a, &sample(at(secs)), Utc::now()).await.unwrap();
        }
        Measurement::insert(&pool, &b, &sample(at(60)), Utc::now()).await.unwrap();

        let window = TimeRange { start: at(50), end: at(100) };
        let all = Measurement::range(&pool, window, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let only_a = Measurement::range(&pool, window, Some(&a)).await.unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|m| m.node_id == a));
    }

    #[tokio::test]
    async fn test_unknown_values_stay_unknown() {
        let pool = test_pool().await;
        let node_id = node(&pool, "k1").await;

        let stored = Measurement::insert(&pool, &node_id, &sample(at(0)), Utc::now())
            .await
            .unwrap();
        assert_eq!(stored.deauth_count, 0);
        assert_eq!(stored.metric(Metric::DeauthCount), Some(0.0));
        assert_eq!(stored.local_wifi_noise_dbm, None);
        assert_eq!(stored.metric(Metric::LocalWifiNoiseDbm), None);
        assert_eq!(stored.metric(Metric::RfJamDetected), None);
    }

    #[tokio::test]
    async fn test_data_range() {
        let pool = test_pool().await;
        assert_eq!(Measurement::data_range(&pool).await.unwrap(), None);

        let node_id = node(&pool, "k1").await;
        for secs in [40, 10, 90] {
            Measurement::insert(&pool, &node_id, &sample(at(secs)), Utc::now()).await.unwrap();
        }

        let range = Measurement::data_range(&pool).await.unwrap().unwrap();
        assert_eq!(range.min_timestamp, at(10));
        assert_eq!(range.max_timestamp, at(90));
    }
}
