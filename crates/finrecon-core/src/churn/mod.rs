//! Per-customer churn risk scoring.
//!
//! Up to five independent signals are computed per customer, each optional:
//! payment failures, usage drop, support tickets, recent plan downgrades,
//! and payment inactivity. The aggregate score amplifies corroborating
//! signals (`x1.1` per additional signal) and buckets into a risk level by
//! ordered thresholds. Explanations and recommended actions are pure
//! functions of the signal set; output ordering is deterministic (score
//! descending, customer id ascending).

mod score;
mod types;


pub use score::score;
pub use types::{
    ChurnInputs, ChurnRisk, ChurnSignal, ChurnSignalType, PlanDowngrade, RiskLevel,
    SupportTicket, TicketSeverity, UsageMetric,
};
