//! Cause suggestions for detected events
//!
//! Plain lookup from event type to weighted candidate causes.

use serde::{Deserialize, Serialize};

use crate::models::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inference {
    pub cause: &'static str,
    pub confidence: Confidence,
    pub description: &'static str,
}

const DEAUTH_CAUSES: &[Inference] = &[Inference {
    cause: "wifi_deauth",
    confidence: Confidence::High,
    description: "Deauth frames detected; possible deauth attack or misconfigured device.",
}];

const DISASSOC_CAUSES: &[Inference] = &[Inference {
    cause: "wifi_disassoc",
    confidence: Confidence::High,
    description: "Disassoc frames detected; possible attack or client disconnects.",
}];

const JAMMING_CAUSES: &[Inference] = &[
    Inference {
        cause: "wifi_rf_jamming",
        confidence: Confidence::High,
        description: "High noise or low SNR; possible RF jamming or interference.",
    },
    Inference {
        cause: "wifi_disassoc",
        confidence: Confidence::Low,
        description: "Clients dropping off under interference can look like a disassoc storm.",
    },
];

/// Candidate causes for `event_type`, most confident first.
///
/// `context_hours` is part of the public contract but does not change the
/// result: the table is keyed by event type only.
pub fn infer(event_type: EventType, context_hours: Option<u32>) -> Vec<Inference> {
    let _ = context_hours;
    let table = match event_type {
        EventType::DeauthBurst => DEAUTH_CAUSES,
        EventType::DisassocBurst => DISASSOC_CAUSES,
        EventType::RfJamming => JAMMING_CAUSES,
    };
    let mut causes = table.to_vec();
    causes.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    causes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deauth_maps_to_single_high_cause() {
        let causes = infer(EventType::DeauthBurst, None);
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].cause, "wifi_deauth");
        assert_eq!(causes[0].confidence, Confidence::High);
    }

    #[test]
    fn test_jamming_causes_sorted_by_confidence() {
        let causes = infer(EventType::RfJamming, None);
        let pairs: Vec<_> = causes.iter().map(|c| (c.cause, c.confidence)).collect();
        assert_eq!(
            pairs,
            vec![("wifi_rf_jamming", Confidence::High), ("wifi_disassoc", Confidence::Low)]
        );
    }

    #[test]
    fn test_context_hours_does_not_change_result() {
        for event_type in [EventType::DeauthBurst, EventType::DisassocBurst, EventType::RfJamming] {
            assert_eq!(infer(event_type, None), infer(event_type, Some(72)));
        }
    }
}
