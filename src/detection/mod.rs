//! Event Detection
//!
//! Pure evaluation of one stored measurement against the configured
//! thresholds. Thresholds are passed in on every call; nothing here reads
//! shared state.
//!
//! Rules:
//! - `deauth_burst`   iff `deauth_count > deauth_count_threshold`
//! - `disassoc_burst` iff `disassoc_count > disassoc_count_threshold`
//! - `rf_jamming`     iff the effective jam flag is set (supplied, or computed
//!   from noise floor and SNR)

pub mod inference;

use serde_json::json;

use crate::config::Thresholds;
use crate::models::{EventType, Measurement, NewEvent, Severity};

/// Count above `SEVERE_FACTOR × threshold` is severe
pub const SEVERE_FACTOR: i64 = 2;

/// Count above `CRITICAL_FACTOR × threshold` is critical
pub const CRITICAL_FACTOR: i64 = 4;

/// Internal fault while evaluating a measurement
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("negative {field} ({value}) in measurement {measurement_id}")]
    NegativeCount {
        field: &'static str,
        value: i64,
        measurement_id: i64,
    },

    #[error("invalid threshold {name}: {reason}")]
    InvalidThreshold { name: &'static str, reason: String },
}

/// Evaluation seam used by ingestion
pub trait Detector: Send + Sync {
    fn evaluate(
        &self,
        measurement: &Measurement,
        thresholds: &Thresholds,
    ) -> Result<Vec<NewEvent>, DetectionError>;
}

/// Production detector: fixed threshold rules
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdDetector;

impl Detector for ThresholdDetector {
    fn evaluate(
        &self,
        measurement: &Measurement,
        thresholds: &Thresholds,
    ) -> Result<Vec<NewEvent>, DetectionError> {
        detect(measurement, thresholds)
    }
}

/// Evaluate all rules; events come out in rule order.
pub fn detect(measurement: &Measurement, thresholds: &Thresholds) -> Result<Vec<NewEvent>, DetectionError> {
    check_thresholds(thresholds)?;
    for (field, value) in [
        ("deauth_count", measurement.deauth_count),
        ("disassoc_count", measurement.disassoc_count),
    ] {
        if value < 0 {
            return Err(DetectionError::NegativeCount {
                field,
                value,
                measurement_id: measurement.id,
            });
        }
    }

    let mut events = Vec::new();

    let deauth = measurement.deauth_count;
    if deauth > thresholds.deauth_count_threshold {
        events.push(NewEvent {
            event_type: EventType::DeauthBurst,
            severity: burst_severity(deauth, thresholds.deauth_count_threshold),
            timestamp: measurement.timestamp,
            description: format!("Deauth frame burst: {} deauth frames in capture window", deauth),
            metrics: json!({ "deauth_count": deauth }),
        });
    }

    let disassoc = measurement.disassoc_count;
    if disassoc > thresholds.disassoc_count_threshold {
        events.push(NewEvent {
            event_type: EventType::DisassocBurst,
            severity: burst_severity(disassoc, thresholds.disassoc_count_threshold),
            timestamp: measurement.timestamp,
            description: format!("Disassoc frame burst: {} disassoc frames in capture window", disassoc),
            metrics: json!({ "disassoc_count": disassoc }),
        });
    }

    let jammed = measurement.rf_jam_detected.or_else(|| {
        rf_jam_from_levels(
            measurement.local_wifi_signal_dbm,
            measurement.local_wifi_noise_dbm,
            thresholds,
        )
    });
    if jammed == Some(true) {
        events.push(NewEvent {
            event_type: EventType::RfJamming,
            severity: Severity::Severe,
            timestamp: measurement.timestamp,
            description: "High noise or low SNR; possible RF jamming or interference".to_string(),
            metrics: json!({
                "rf_jam_detected": 1,
                "local_wifi_signal_dbm": measurement.local_wifi_signal_dbm,
                "local_wifi_noise_dbm": measurement.local_wifi_noise_dbm,
            }),
        });
    }

    Ok(events)
}

/// Compute the jam flag from signal and noise floor.
///
/// `None` only when both levels are unknown; any known level without a
/// firing rule is a negative determination.
pub fn rf_jam_from_levels(
    signal_dbm: Option<f64>,
    noise_dbm: Option<f64>,
    thresholds: &Thresholds,
) -> Option<bool> {
    match (signal_dbm, noise_dbm) {
        (None, None) => None,
        (_, Some(noise)) if noise > thresholds.jamming_noise_threshold_dbm => Some(true),
        (Some(signal), Some(noise)) => Some(signal - noise < thresholds.jamming_snr_threshold_db),
        _ => Some(false),
    }
}

/// Banding proportional to the threshold
pub fn burst_severity(count: i64, threshold: i64) -> Severity {
    if count > threshold.saturating_mul(CRITICAL_FACTOR) {
        Severity::Critical
    } else if count > threshold.saturating_mul(SEVERE_FACTOR) {
        Severity::Severe
    } else {
        Severity::Moderate
    }
}

fn check_thresholds(thresholds: &Thresholds) -> Result<(), DetectionError> {
    for (name, value) in [
        ("deauth_count_threshold", thresholds.deauth_count_threshold),
        ("disassoc_count_threshold", thresholds.disassoc_count_threshold),
    ] {
        if value < 0 {
            return Err(DetectionError::InvalidThreshold {
                name,
                reason: format!("must be non-negative, got {}", value),
            });
        }
    }
    for (name, value) in [
        ("jamming_noise_threshold_dbm", thresholds.jamming_noise_threshold_dbm),
        ("jamming_snr_threshold_db", thresholds.jamming_snr_threshold_db),
    ] {
        if !value.is_finite() {
            return Err(DetectionError::InvalidThreshold {
                name,
                reason: format!("must be finite, got {}", value),
            });
        }
    }
    Ok(())
}
