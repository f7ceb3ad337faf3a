//! Query Service - read path for dashboards and other consumers

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::RelayNode;
use crate::detection::inference::{infer, Inference};
use crate::models::{
    available_metrics, parse_timestamp, ChannelAmplitude, DataRange, Event, EventType, Measurement,
    Metric, MetricDescriptor, Node, NodeSummary, TimeRange,
};
use crate::{AppError, AppResult};

/// Window used when a range query gives no start
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Column-oriented measurement series
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub node_ids: Vec<String>,
    pub data: BTreeMap<&'static str, Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; `None` below two values
    pub std: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub data_points: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub metrics: BTreeMap<&'static str, MetricStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceReport {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub context_hours: Option<u32>,
    pub inferences: Vec<Inference>,
}

/// Build a range from optional query bounds.
pub fn resolve_range(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> AppResult<TimeRange> {
    let parse = |name: &str, raw: &str| {
        parse_timestamp(raw).ok_or_else(|| AppError::BadRequest(format!("Invalid {}: {}", name, raw)))
    };

    let end = match end.filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse("end", raw)?,
        None => now,
    };
    let start = match start.filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse("start", raw)?,
        None => end - Duration::hours(DEFAULT_WINDOW_HOURS),
    };

    if start > end {
        return Err(AppError::BadRequest("start must not be after end".to_string()));
    }
    Ok(TimeRange { start, end })
}

/// Parse a comma-separated metric list. `None` / empty selects every metric.
pub fn parse_metrics(raw: Option<&str>) -> AppResult<Vec<Metric>> {
    let names: Vec<&str> = raw
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        return Ok(Metric::ALL.to_vec());
    }

    let mut metrics = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
        match Metric::parse(name) {
            Some(metric) if !metrics.contains(&metric) => metrics.push(metric),
            Some(_) => {}
            None => unknown.push(name),
        }
    }

    if !unknown.is_empty() {
        return Err(AppError::BadRequest(format!("Unknown metrics: {}", unknown.join(", "))));
    }
    Ok(metrics)
}

#[derive(Clone)]
pub struct QueryService {
    pool: SqlitePool,
    relay_node: Option<RelayNode>,
}

impl QueryService {
    pub fn new(pool: SqlitePool, relay_node: Option<RelayNode>) -> Self {
        Self { pool, relay_node }
    }

    pub async fn measurement_series(
        &self,
        range: TimeRange,
        metrics: &[Metric],
        node_id: Option<&str>,
    ) -> AppResult<MetricSeries> {
        let rows = Measurement::range(&self.pool, range, node_id).await?;

        let mut series = MetricSeries {
            timestamps: Vec::with_capacity(rows.len()),
            node_ids: Vec::with_capacity(rows.len()),
            data: metrics
                .iter()
                .map(|m| (m.as_str(), Vec::with_capacity(rows.len())))
                .collect(),
        };
        for row in &rows {
            series.timestamps.push(row.timestamp);
            series.node_ids.push(row.node_id.clone());
            for metric in metrics {
                if let Some(column) = series.data.get_mut(metric.as_str()) {
                    column.push(row.metric(*metric));
                }
            }
        }
        Ok(series)
    }

    pub async fn events(&self, range: TimeRange, node_id: Option<&str>) -> AppResult<Vec<Event>> {
        Ok(Event::range(&self.pool, range, node_id).await?)
    }

    pub async fn event_inferences(&self, event_id: Uuid, context_hours: Option<u32>) -> AppResult<InferenceReport> {
        let event = Event::find_by_id(&self.pool, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        Ok(InferenceReport {
            event_id: event.id,
            event_type: event.event_type,
            context_hours,
            inferences: infer(event.event_type, context_hours),
        })
    }

    /// Registered nodes. `located_only` is the map view: nodes with both
    /// coordinates, led by the relay's own marker when configured.
    pub async fn list_nodes(&self, located_only: bool) -> AppResult<Vec<NodeSummary>> {
        let nodes = Node::list(&self.pool).await?;

        if !located_only {
            return Ok(nodes.iter().map(Node::summary).collect());
        }

        let relay = self.relay_node.as_ref().map(|r| NodeSummary {
            id: "relay".to_string(),
            name: r.name.clone(),
            latitude: Some(r.latitude),
            longitude: Some(r.longitude),
            last_seen: None,
        });
        Ok(relay
            .into_iter()
            .chain(nodes.iter().filter(|n| n.has_location()).map(Node::summary))
            .collect())
    }

    pub async fn data_range(&self) -> AppResult<Option<DataRange>> {
        Ok(Measurement::data_range(&self.pool).await?)
    }

    pub fn available_metrics(&self) -> Vec<MetricDescriptor> {
        available_metrics()
    }

    pub async fn summary(&self, range: TimeRange) -> AppResult<SummaryStats> {
        let rows = Measurement::range(&self.pool, range, None).await?;

        let metrics = Metric::ALL
            .iter()
            .filter_map(|metric| {
                let values: Vec<f64> = rows.iter().filter_map(|r| r.metric(*metric)).collect();
                metric_stats(&values).map(|stats| (metric.as_str(), stats))
            })
            .collect();

        Ok(SummaryStats {
            data_points: rows.len(),
            start: range.start,
            end: range.end,
            metrics,
        })
    }

    pub async fn channel_amplitude(&self, range: TimeRange) -> AppResult<Vec<ChannelAmplitude>> {
        Ok(ChannelAmplitude::range(&self.pool, range).await?)
    }
}

fn metric_stats(values: &[f64]) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std = (values.len() > 1).then(|| {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    });
    Some(MetricStats { mean, min, max, std })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::detection::ThresholdDetector;
    use crate::models::NodeIdentity;
    use crate::services::IngestionService;
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn services(relay_node: Option<RelayNode>) -> (IngestionService, QueryService) {
        let pool = test_pool().await;
        let ingest = IngestionService::new(pool.clone(), &Config::default(), Arc::new(ThresholdDetector));
        (ingest, QueryService::new(pool, relay_node))
    }

    fn jan(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs as i64)
    }

    fn whole_day() -> TimeRange {
        TimeRange { start: jan(0), end: jan(86_399) }
    }

    #[test]
    fn test_resolve_range_defaults() {
        let now = jan(50_000);
        let range = resolve_range(None, None, now).unwrap();
        assert_eq!(range.end, now);
        assert_eq!(range.start, now - Duration::hours(24));

        let range = resolve_range(Some("2024-01-01T00:00:00Z"), Some(""), now).unwrap();
        assert_eq!(range.start, jan(0));
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_resolve_range_rejects_bad_input() {
        let now = Utc::now();
        assert!(matches!(resolve_range(Some("nope"), None, now), Err(AppError::BadRequest(_))));
        assert!(matches!(
            resolve_range(Some("2024-01-02T00:00:00Z"), Some("2024-01-01T00:00:00Z"), now),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_metrics() {
        assert_eq!(parse_metrics(None).unwrap().len(), Metric::ALL.len());
        assert_eq!(
            parse_metrics(Some("deauth_count, noise_dbm,deauth_count")).unwrap(),
            vec![Metric::DeauthCount, Metric::NoiseDbm]
        );
        assert!(matches!(parse_metrics(Some("deauth_count,cpu")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_metric_stats() {
        assert_eq!(metric_stats(&[]), None);

        let single = metric_stats(&[4.0]).unwrap();
        assert_eq!(single.mean, 4.0);
        assert_eq!(single.std, None);

        let stats = metric_stats(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(stats.mean, 4.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.std, Some(2.0));
    }

    #[tokio::test]
    async fn test_series_preserves_unknown_values() {
        let (ingest, query) = services(None).await;
        ingest
            .ingest(Some("k1"), br#"{"timestamp": "2024-01-01T00:00:20Z", "local_wifi_noise_dbm": -95}"#)
            .await
            .unwrap();
        ingest
            .ingest(Some("k1"), br#"{"timestamp": "2024-01-01T00:00:10Z", "deauth_count": 2}"#)
            .await
            .unwrap();

        let metrics = [Metric::DeauthCount, Metric::LocalWifiNoiseDbm];
        let series = query.measurement_series(whole_day(), &metrics, None).await.unwrap();

        assert_eq!(series.timestamps, vec![jan(10), jan(20)]);
        assert_eq!(series.data.len(), 2);
        assert_eq!(series.data["deauth_count"], vec![Some(2.0), Some(0.0)]);
        assert_eq!(series.data["local_wifi_noise_dbm"], vec![None, Some(-95.0)]);
    }

    #[tokio::test]
    async fn test_events_and_inferences() {
        let (ingest, query) = services(None).await;
        ingest
            .ingest(Some("k1"), br#"{"timestamp": "2024-01-01T00:01:00Z", "rf_jam_detected": 1}"#)
            .await
            .unwrap();

        let events = query.events(whole_day(), None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::RfJamming);

        let report = query.event_inferences(events[0].id, Some(24)).await.unwrap();
        assert_eq!(report.context_hours, Some(24));
        assert_eq!(report.inferences[0].cause, "wifi_rf_jamming");

        assert!(matches!(
            query.event_inferences(Uuid::new_v4(), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_nodes_map_view() {
        let relay = RelayNode {
            name: "Roof".to_string(),
            latitude: 1.0,
            longitude: 2.0,
        };
        let (ingest, query) = services(Some(relay)).await;
        ingest
            .ingest(Some("k1"), br#"{"node_name": "Placed", "latitude": 10.0, "longitude": 20.0}"#)
            .await
            .unwrap();
        ingest.ingest(Some("k2"), br#"{"latitude": 10.0}"#).await.unwrap();

        let all = query.list_nodes(false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|n| n.id != "relay"));

        let map = query.list_nodes(true).await.unwrap();
        let ids: Vec<&str> = map.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["relay", NodeIdentity::derive("k1").id.as_str()]);
        assert_eq!(map[1].name, "Placed");
        assert!(map[0].last_seen.is_none());
    }

    #[tokio::test]
    async fn test_summary_and_data_range() {
        let (ingest, query) = services(None).await;
        assert!(query.data_range().await.unwrap().is_none());

        for (ts, count) in [("00:00:10", 2), ("00:00:20", 4), ("00:00:30", 6)] {
            let body = format!(r#"{{"timestamp": "2024-01-01T{}Z", "deauth_count": {}}}"#, ts, count);
            ingest.ingest(Some("k1"), body.as_bytes()).await.unwrap();
        }

        let summary = query.summary(whole_day()).await.unwrap();
        assert_eq!(summary.data_points, 3);
        assert_eq!(summary.metrics["deauth_count"].mean, 4.0);
        assert!(!summary.metrics.contains_key("noise_dbm"));

        let range = query.data_range().await.unwrap().unwrap();
        assert_eq!(range.min_timestamp, jan(10));
        assert_eq!(range.max_timestamp, jan(30));

        assert_eq!(query.available_metrics().len(), 8);
    }

}
