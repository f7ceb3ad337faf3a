//! Ingestion Service
//!
//! Turns an authenticated submission into a stored measurement plus any
//! events it triggers. The node upsert and the measurement append commit
//! together; detection runs afterwards and can never undo the append.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::config::{Config, Thresholds};
use crate::detection::{rf_jam_from_levels, Detector};
use crate::models::{
    parse_timestamp, ChannelAmplitude, Event, Measurement, MeasurementSubmission, NewChannelSample,
    NewMeasurement, Node, NodeIdentity, NodeUpdate,
};
use crate::{AppError, AppResult};

/// Result of a successful measurement submission
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub node_id: String,
    pub measurement_id: i64,
    pub events: Vec<Event>,
    /// Non-fatal detection / event-log problem
    pub warning: Option<String>,
}

/// Result of a channel amplitude submission
#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub node_id: String,
    pub stored: usize,
}

/// Check a presented credential against the relay's shared secret.
///
/// Returns the trimmed credential. Without a shared secret any non-empty
/// credential is accepted and becomes its own node.
pub fn authenticate<'a>(credential: Option<&'a str>, shared_secret: Option<&str>) -> AppResult<&'a str> {
    let credential = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(AppError::Unauthorized)?;

    match shared_secret {
        Some(secret) if secret != credential => Err(AppError::Unauthorized),
        _ => Ok(credential),
    }
}

#[derive(Clone)]
pub struct IngestionService {
    pool: SqlitePool,
    thresholds: Thresholds,
    shared_secret: Option<String>,
    detector: Arc<dyn Detector>,
}

impl IngestionService {
    pub fn new(pool: SqlitePool, config: &Config, detector: Arc<dyn Detector>) -> Self {
        Self {
            pool,
            thresholds: config.thresholds.clone(),
            shared_secret: config.relay_api_key.clone(),
            detector,
        }
    }

    pub fn authenticate<'a>(&self, credential: Option<&'a str>) -> AppResult<&'a str> {
        authenticate(credential, self.shared_secret.as_deref())
    }

    /// Ingest one measurement submission.
    pub async fn ingest(&self, credential: Option<&str>, payload: &[u8]) -> AppResult<IngestOutcome> {
        let credential = self.authenticate(credential)?;

        let submission: MeasurementSubmission = parse_json(payload)?;
        submission.validate()?;

        let now = Utc::now();
        let (update, data) = self.normalize(submission, now)?;
        let identity = NodeIdentity::derive(credential);

        let mut tx = self.pool.begin().await?;
        let node = resolve_node(&mut tx, &identity, &update, now).await?;
        let measurement = Measurement::insert(&mut *tx, &node.id, &data, now).await?;
        tx.commit().await?;

        tracing::debug!(
            node_id = %node.id,
            measurement_id = measurement.id,
            timestamp = %measurement.timestamp,
            "Measurement stored"
        );

        let (events, warning) = self.detect_and_log(&measurement).await;

        Ok(IngestOutcome {
            node_id: node.id,
            measurement_id: measurement.id,
            events,
            warning,
        })
    }

    /// Ingest a batch of per-channel amplitude samples.
    ///
    /// Unusable samples are skipped, a `samples` value that is not an array
    /// rejects the whole request.
    pub async fn ingest_channel_amplitude(
        &self,
        credential: Option<&str>,
        payload: &[u8],
    ) -> AppResult<ChannelOutcome> {
        let credential = self.authenticate(credential)?;

        let body: serde_json::Value = parse_json(payload)?;
        let samples = match body.get("samples").or_else(|| body.get("channel_amplitude")) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(_) => return Err(AppError::BadRequest("samples must be an array".to_string())),
        };
        let accepted: Vec<NewChannelSample> = samples.iter().filter_map(NewChannelSample::from_value).collect();
        if accepted.len() < samples.len() {
            tracing::debug!(skipped = samples.len() - accepted.len(), "Skipped unusable channel samples");
        }

        let now = Utc::now();
        let identity = NodeIdentity::derive(credential);

        let mut tx = self.pool.begin().await?;
        let node = resolve_node(&mut tx, &identity, &NodeUpdate::default(), now).await?;
        for sample in &accepted {
            ChannelAmplitude::insert(&mut *tx, &node.id, sample).await?;
        }
        tx.commit().await?;

        Ok(ChannelOutcome {
            node_id: node.id,
            stored: accepted.len(),
        })
    }

    fn normalize(
        &self,
        submission: MeasurementSubmission,
        now: DateTime<Utc>,
    ) -> AppResult<(NodeUpdate, NewMeasurement)> {
        let timestamp = match submission.timestamp.as_deref().map(str::trim) {
            None | Some("") => now,
            Some(raw) => parse_timestamp(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Invalid timestamp: {}", raw)))?,
        };

        let rf_jam_detected = match submission.rf_jam_detected {
            Some(flag) => Some(
                flag.to_bool()
                    .ok_or_else(|| AppError::BadRequest("rf_jam_detected must be 0 or 1".to_string()))?,
            ),
            None => rf_jam_from_levels(
                submission.local_wifi_signal_dbm,
                submission.local_wifi_noise_dbm,
                &self.thresholds,
            ),
        };

        let update = NodeUpdate {
            display_name: submission
                .node_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            latitude: submission.latitude,
            longitude: submission.longitude,
        };

        let data = NewMeasurement {
            timestamp,
            wifi_channel: submission.wifi_channel,
            wifi_util_pct: submission.wifi_util_pct,
            noise_dbm: submission.noise_dbm,
            deauth_count: submission.deauth_count.unwrap_or(0),
            disassoc_count: submission.disassoc_count.unwrap_or(0),
            local_wifi_signal_dbm: submission.local_wifi_signal_dbm,
            local_wifi_noise_dbm: submission.local_wifi_noise_dbm,
            rf_jam_detected,
        };

        Ok((update, data))
    }

    /// Run the detector and log its events. Failures here are reported as a
    /// warning; the measurement is already durable.
    async fn detect_and_log(&self, measurement: &Measurement) -> (Vec<Event>, Option<String>) {
        let detected = match self.detector.evaluate(measurement, &self.thresholds) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(measurement_id = measurement.id, error = %e, "Detection failed");
                return (Vec::new(), Some(format!("detection failed: {}", e)));
            }
        };

        let mut logged = Vec::with_capacity(detected.len());
        let mut failures = 0;
        for new_event in &detected {
            match Event::append(&self.pool, &measurement.node_id, measurement.id, new_event).await {
                Ok(event) => {
                    tracing::info!(
                        node_id = %event.node_id,
                        event_type = %event.event_type,
                        severity = ?event.severity,
                        "{}",
                        event.description
                    );
                    logged.push(event);
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        measurement_id = measurement.id,
                        event_type = %new_event.event_type,
                        error = %e,
                        "Failed to log event"
                    );
                }
            }
        }

        let warning = (failures > 0).then(|| format!("{} detected event(s) could not be logged", failures));
        (logged, warning)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(payload: &[u8]) -> AppResult<T> {
    let payload = if payload.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        payload
    };
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(AppError::BadRequest("Payload must be a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| AppError::BadRequest(format!("Invalid field: {}", e)))
}

async fn resolve_node(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    identity: &NodeIdentity,
    update: &NodeUpdate,
    now: DateTime<Utc>,
) -> AppResult<Node> {
    let node = Node::resolve_or_create(&mut **tx, identity, update, now)
        .await?
        .ok_or_else(|| {
            AppError::InternalError(format!("node id {} is owned by another credential", identity.id))
        })?;

    if node.created_at == now {
        tracing::info!(node_id = %node.id, name = %node.name(), "Node registered");
    }
    Ok(node)
}
