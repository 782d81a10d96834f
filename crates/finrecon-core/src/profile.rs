//! Static per-tenant threshold profiles.
//!
//! A profile bundles the anomaly-detection and churn-scoring thresholds for
//! one operating posture. Lookup by id falls back to the base profile on
//! unknown ids, so a misconfigured profile reference degrades to defaults
//! instead of failing a batch. Thresholds are plain serde structs so
//! operators can ship overrides as JSON.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of the default profile.
pub const BASE_PROFILE_ID: &str = "base";

/// Thresholds driving the anomaly rule battery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyThresholds {
    /// Duplicate-event window in seconds.
    pub duplicate_window_seconds: i64,
    /// Absolute refund total (cents) that triggers a refund spike.
    pub refund_spike_cents: i64,
    /// Refund percentage of revenue that escalates the spike to critical.
    pub refund_spike_pct: f64,
    /// Dispute-event count that triggers a dispute spike.
    pub dispute_count: usize,
    /// Per-customer payment failure rate that triggers a failure spike.
    pub payment_failure_rate: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            duplicate_window_seconds: 300,
            refund_spike_cents: 100_000,
            refund_spike_pct: 20.0,
            dispute_count: 3,
            payment_failure_rate: 0.25,
        }
    }
}

/// Thresholds and signal weights driving the churn risk model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChurnThresholds {
    /// Base weight for the payment-failures signal.
    pub payment_failure_weight: f64,
    /// Base weight for the usage-drop signal.
    pub usage_drop_weight: f64,
    /// Base weight for the support-tickets signal.
    pub support_ticket_weight: f64,
    /// Base weight for the plan-downgrade signal.
    pub downgrade_weight: f64,
    /// Base weight for the inactivity signal.
    pub inactivity_weight: f64,
    /// Score at or above which risk is at least medium.
    pub medium_score: u32,
    /// Score at or above which risk is at least high.
    pub high_score: u32,
    /// Score at or above which risk is critical.
    pub critical_score: u32,
}

impl Default for ChurnThresholds {
    fn default() -> Self {
        Self {
            payment_failure_weight: 0.3,
            usage_drop_weight: 0.25,
            support_ticket_weight: 0.2,
            downgrade_weight: 0.25,
            inactivity_weight: 0.2,
            medium_score: 25,
            high_score: 50,
            critical_score: 75,
        }
    }
}

/// A complete threshold profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    /// Profile identifier.
    pub profile_id: String,
    /// Anomaly rule thresholds.
    pub anomaly: AnomalyThresholds,
    /// Churn model thresholds.
    pub churn: ChurnThresholds,
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self {
            profile_id: BASE_PROFILE_ID.to_string(),
            anomaly: AnomalyThresholds::default(),
            churn: ChurnThresholds::default(),
        }
    }
}

/// Looks up a profile by id, falling back to the base profile on unknown
/// ids.
#[must_use]
pub fn lookup(profile_id: &str) -> ThresholdProfile {
    match profile_id {
        BASE_PROFILE_ID => ThresholdProfile::default(),
        "high-volume" => ThresholdProfile {
            profile_id: "high-volume".to_string(),
            anomaly: AnomalyThresholds {
                refund_spike_cents: 1_000_000,
                refund_spike_pct: 30.0,
                dispute_count: 10,
                ..AnomalyThresholds::default()
            },
            churn: ChurnThresholds {
                medium_score: 35,
                high_score: 60,
                critical_score: 85,
                ..ChurnThresholds::default()
            },
        },
        "strict" => ThresholdProfile {
            profile_id: "strict".to_string(),
            anomaly: AnomalyThresholds {
                duplicate_window_seconds: 600,
                refund_spike_cents: 25_000,
                refund_spike_pct: 10.0,
                dispute_count: 1,
                payment_failure_rate: 0.1,
                ..AnomalyThresholds::default()
            },
            churn: ChurnThresholds {
                medium_score: 15,
                high_score: 35,
                critical_score: 60,
                ..ChurnThresholds::default()
            },
        },
        unknown => {
            debug!(profile_id = unknown, "unknown profile id, using base profile");
            ThresholdProfile::default()
        },
    }
}
