//! Configuration module

use std::env;
use std::str::FromStr;

use serde::Serialize;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum pooled database connections
    pub db_max_connections: u32,

    /// Server port
    pub port: u16,

    /// Shared node secret. `None` means any credential self-registers.
    pub relay_api_key: Option<String>,

    /// Environment (development, production)
    pub environment: String,

    /// Detection thresholds, fixed for the process lifetime
    pub thresholds: Thresholds,

    /// Collector settings handed to nodes on `GET /api/config`
    pub collector: CollectorSettings,

    /// The relay's own position on the node map
    pub relay_node: Option<RelayNode>,
}

/// Detection parameters consumed by the event detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub deauth_count_threshold: i64,
    pub disassoc_count_threshold: i64,
    pub jamming_noise_threshold_dbm: f64,
    pub jamming_snr_threshold_db: f64,
}

pub const DEFAULT_DEAUTH_COUNT_THRESHOLD: i64 = 5;
pub const DEFAULT_JAMMING_NOISE_THRESHOLD_DBM: f64 = -70.0;
pub const DEFAULT_JAMMING_SNR_THRESHOLD_DB: f64 = 10.0;

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            deauth_count_threshold: DEFAULT_DEAUTH_COUNT_THRESHOLD,
            disassoc_count_threshold: DEFAULT_DEAUTH_COUNT_THRESHOLD,
            jamming_noise_threshold_dbm: DEFAULT_JAMMING_NOISE_THRESHOLD_DBM,
            jamming_snr_threshold_db: DEFAULT_JAMMING_SNR_THRESHOLD_DB,
        }
    }
}

/// Local WiFi collector settings, read-only for nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorSettings {
    pub enabled: bool,
    pub interface: String,
    pub ssid: Option<String>,
    pub channel: Option<u32>,
    pub monitor_capture_seconds: u32,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interface: "wlan0".to_string(),
            ssid: None,
            channel: None,
            monitor_capture_seconds: 30,
        }
    }
}

/// Relay's own map marker
#[derive(Debug, Clone, PartialEq)]
pub struct RelayNode {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values are treated as unset.
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let deauth = parse_or(var("DEAUTH_COUNT_THRESHOLD"), DEFAULT_DEAUTH_COUNT_THRESHOLD);
        let thresholds = Thresholds {
            deauth_count_threshold: deauth,
            disassoc_count_threshold: parse_or(var("DISASSOC_COUNT_THRESHOLD"), deauth),
            jamming_noise_threshold_dbm: parse_or(
                var("JAMMING_NOISE_THRESHOLD_DBM"),
                DEFAULT_JAMMING_NOISE_THRESHOLD_DBM,
            ),
            jamming_snr_threshold_db: parse_or(
                var("JAMMING_SNR_THRESHOLD_DB"),
                DEFAULT_JAMMING_SNR_THRESHOLD_DB,
            ),
        };

        let defaults = CollectorSettings::default();
        let collector = CollectorSettings {
            enabled: var("COLLECTOR_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.enabled),
            interface: var("COLLECTOR_INTERFACE").unwrap_or(defaults.interface),
            ssid: var("COLLECTOR_SSID"),
            channel: var("COLLECTOR_CHANNEL").and_then(|c| c.parse().ok()),
            monitor_capture_seconds: parse_or(
                var("COLLECTOR_CAPTURE_SECONDS"),
                defaults.monitor_capture_seconds,
            ),
        };

        let relay_node = match (
            var("NODE_LATITUDE").and_then(|v| v.parse().ok()),
            var("NODE_LONGITUDE").and_then(|v| v.parse().ok()),
        ) {
            (Some(latitude), Some(longitude)) => Some(RelayNode {
                name: var("NODE_NAME").unwrap_or_else(|| "Relay".to_string()),
                latitude,
                longitude,
            }),
            _ => None,
        };

        Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/monitoring.db".to_string()),

            db_max_connections: parse_or(var("DB_MAX_CONNECTIONS"), 10),

            port: parse_or(var("PORT"), 8051),

            relay_api_key: var("RELAY_API_KEY"),

            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),

            thresholds,
            collector,
            relay_node,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
