//! Channel amplitude model - per-channel signal/noise from node channel scans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::measurement::{parse_timestamp, TimeRange};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelAmplitude {
    pub id: i64,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub channel: i64,
    pub signal_dbm: Option<f64>,
    pub noise_dbm: Option<f64>,
}

/// One accepted sample, ready to append
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannelSample {
    pub timestamp: DateTime<Utc>,
    pub channel: i64,
    pub signal_dbm: Option<f64>,
    pub noise_dbm: Option<f64>,
}

impl NewChannelSample {
    /// Read one raw sample; anything without a usable timestamp and channel is skipped.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let timestamp = parse_timestamp(obj.get("timestamp")?.as_str()?)?;
        let channel = parse_channel(obj.get("channel")?)?;
        Some(Self {
            timestamp,
            channel,
            signal_dbm: obj.get("signal_dbm").and_then(serde_json::Value::as_f64),
            noise_dbm: obj.get("noise_dbm").and_then(serde_json::Value::as_f64),
        })
    }
}

/// Channel numbers arrive as integers, floats (`6.0`) or numeric strings.
fn parse_channel(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ChannelAmplitude {
    pub async fn insert<'e, E>(
        executor: E,
        node_id: &str,
        sample: &NewChannelSample,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO channel_amplitude (node_id, timestamp, channel, signal_dbm, noise_dbm)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#
        )
        .bind(node_id)
        .bind(sample.timestamp)
        .bind(sample.channel)
        .bind(sample.signal_dbm)
        .bind(sample.noise_dbm)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn range(pool: &SqlitePool, range: TimeRange) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChannelAmplitude>(
            r#"
            SELECT * FROM channel_amplitude
            WHERE timestamp >= ?1 AND timestamp <= ?2
            ORDER BY timestamp ASC, id ASC
            "#
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sample_parsing() {
        let sample = NewChannelSample::from_value(&json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "channel": 11,
            "signal_dbm": -61.5
        }))
        .unwrap();
        assert_eq!(sample.channel, 11);
        assert_eq!(sample.signal_dbm, Some(-61.5));
        assert_eq!(sample.noise_dbm, None);
    }

    #[test]
    fn test_unusable_samples_are_skipped() {
        assert!(NewChannelSample::from_value(&json!("not an object")).is_none());
        assert!(NewChannelSample::from_value(&json!({ "channel": 6 })).is_none());
        assert!(NewChannelSample::from_value(&json!({ "timestamp": "2024-03-01T12:00:00Z" })).is_none());
        assert!(NewChannelSample::from_value(&json!({ "timestamp": "soon", "channel": 6 })).is_none());
    }

    #[test]
    fn test_channel_accepts_float_and_string() {
        let parse = |channel: serde_json::Value| {
            NewChannelSample::from_value(&json!({ "timestamp": "2024-03-01T12:00:00Z", "channel": channel }))
                .map(|s| s.channel)
        };
        assert_eq!(parse(json!(6.0)), Some(6));
        assert_eq!(parse(json!(" 36 ")), Some(36));
        assert_eq!(parse(json!("six")), None);
        assert_eq!(parse(json!(null)), None);
    }
}
