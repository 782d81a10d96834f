//! Anomaly record types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anomaly categories.
///
/// Seven have detectors; `UnusualAmount` and `CurrencyMismatch` are
/// reserved so stored reports from other producers remain readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    DuplicateEvent,
    MissingInvoice,
    DoubleCharge,
    RefundSpike,
    DisputeSpike,
    PaymentFailureSpike,
    OutOfSequence,
    UnusualAmount,
    CurrencyMismatch,
}

impl AnomalyType {
    /// Snake-case wire name, also used as the id prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateEvent => "duplicate_event",
            Self::MissingInvoice => "missing_invoice",
            Self::DoubleCharge => "double_charge",
            Self::RefundSpike => "refund_spike",
            Self::DisputeSpike => "dispute_spike",
            Self::PaymentFailureSpike => "payment_failure_spike",
            Self::OutOfSequence => "out_of_sequence",
            Self::UnusualAmount => "unusual_amount",
            Self::CurrencyMismatch => "currency_mismatch",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Snake-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A detected anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Deterministic id: type prefix plus 16 hex chars of the content hash
    /// of (type, tenant, project, discriminating key).
    pub anomaly_id: String,
    /// Category.
    pub anomaly_type: AnomalyType,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Severity.
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable description.
    pub description: String,
    /// Event ids implicated in the anomaly. May be empty when the anomaly
    /// is the absence of events.
    pub affected_events: Vec<String>,
    /// When detection ran (stable sentinel under stable output).
    pub detected_at: DateTime<Utc>,
    /// Detector-specific details.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Anomaly {
    /// Checks this record against its own output shape. Items failing the
    /// check are dropped by the detector pass.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.anomaly_id.is_empty()
            && self
                .anomaly_id
                .starts_with(self.anomaly_type.as_str())
            && !self.description.is_empty()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}
