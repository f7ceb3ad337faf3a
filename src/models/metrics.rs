//! RF metric catalogue
//!
//! The closed set of metrics the relay understands. Static, not derived
//! from what happens to be stored.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    WifiChannel,
    WifiUtilPct,
    NoiseDbm,
    DeauthCount,
    DisassocCount,
    LocalWifiSignalDbm,
    LocalWifiNoiseDbm,
    RfJamDetected,
}

/// Metric listing entry for consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub unit: &'static str,
    pub category: &'static str,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::WifiChannel,
        Metric::WifiUtilPct,
        Metric::NoiseDbm,
        Metric::DeauthCount,
        Metric::DisassocCount,
        Metric::LocalWifiSignalDbm,
        Metric::LocalWifiNoiseDbm,
        Metric::RfJamDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::WifiChannel => "wifi_channel",
            Metric::WifiUtilPct => "wifi_util_pct",
            Metric::NoiseDbm => "noise_dbm",
            Metric::DeauthCount => "deauth_count",
            Metric::DisassocCount => "disassoc_count",
            Metric::LocalWifiSignalDbm => "local_wifi_signal_dbm",
            Metric::LocalWifiNoiseDbm => "local_wifi_noise_dbm",
            Metric::RfJamDetected => "rf_jam_detected",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    pub fn descriptor(&self) -> MetricDescriptor {
        let (display_name, unit) = match self {
            Metric::WifiChannel => ("WiFi Channel", ""),
            Metric::WifiUtilPct => ("WiFi Utilization", "%"),
            Metric::NoiseDbm => ("Noise", "dBm"),
            Metric::DeauthCount => ("Deauth Count", ""),
            Metric::DisassocCount => ("Disassoc Count", ""),
            Metric::LocalWifiSignalDbm => ("Signal", "dBm"),
            Metric::LocalWifiNoiseDbm => ("Noise Floor", "dBm"),
            Metric::RfJamDetected => ("RF Jam Detected", ""),
        };
        MetricDescriptor {
            name: self.as_str(),
            display_name,
            unit,
            category: "local_wifi",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptors for every metric, in catalogue order
pub fn available_metrics() -> Vec<MetricDescriptor> {
    Metric::ALL.iter().map(Metric::descriptor).collect()
}
