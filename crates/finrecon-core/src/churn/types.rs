//! Churn model input and output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Churn signal categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnSignalType {
    PaymentFailures,
    UsageDrop,
    SupportTickets,
    PlanDowngrade,
    Inactivity,
}

impl ChurnSignalType {
    /// Snake-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentFailures => "payment_failures",
            Self::UsageDrop => "usage_drop",
            Self::SupportTickets => "support_tickets",
            Self::PlanDowngrade => "plan_downgrade",
            Self::Inactivity => "inactivity",
        }
    }
}

/// One weighted churn signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnSignal {
    /// Signal category.
    pub signal_type: ChurnSignalType,
    /// Weight in `[0, 1]`.
    pub weight: f64,
    /// Human-readable detail.
    pub detail: String,
}

/// Bucketed risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Scored churn risk for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnRisk {
    /// Customer identifier.
    pub customer_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Aggregate risk score in `[0, 100]`.
    pub risk_score: u32,
    /// Bucketed level derived from the score.
    pub risk_level: RiskLevel,
    /// Contributing signals, sorted by weight descending.
    pub signals: Vec<ChurnSignal>,
    /// Explanation derived purely from the signal set.
    pub explanation: String,
    /// Recommended actions derived purely from the signal set.
    pub recommended_actions: Vec<String>,
}

/// Usage observation for one customer metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetric {
    /// Customer identifier.
    pub customer_id: String,
    /// Metric name (e.g. `api_calls`).
    pub metric_name: String,
    /// Previous-period value.
    pub previous_value: f64,
    /// Current-period value.
    pub current_value: f64,
}

impl UsageMetric {
    /// Percentage drop from previous to current, zero when previous is
    /// non-positive or usage grew.
    #[must_use]
    pub fn drop_pct(&self) -> f64 {
        if self.previous_value <= 0.0 {
            return 0.0;
        }
        ((self.previous_value - self.current_value) / self.previous_value * 100.0).max(0.0)
    }
}

/// Ticket severity reported by the support system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Support ticket reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    /// Customer identifier.
    pub customer_id: String,
    /// Ticket identifier.
    pub ticket_id: String,
    /// Whether the ticket is still open.
    pub open: bool,
    /// Reported severity.
    pub severity: TicketSeverity,
}

/// A recorded plan downgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDowngrade {
    /// Customer identifier.
    pub customer_id: String,
    /// Plan before the downgrade.
    pub from_plan: String,
    /// Plan after the downgrade.
    pub to_plan: String,
    /// When the downgrade happened.
    pub occurred_at: DateTime<Utc>,
}

/// External signal envelope consumed by the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnInputs {
    /// Usage observations.
    #[serde(default)]
    pub usage_metrics: Vec<UsageMetric>,
    /// Support tickets.
    #[serde(default)]
    pub support_tickets: Vec<SupportTicket>,
    /// Plan downgrades.
    #[serde(default)]
    pub plan_downgrades: Vec<PlanDowngrade>,
    /// Reference date for recency windows; defaults to the ledger window
    /// end when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<DateTime<Utc>>,
}
