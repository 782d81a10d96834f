//! Signal computation and aggregate scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{
    ChurnInputs, ChurnRisk, ChurnSignal, ChurnSignalType, RiskLevel, TicketSeverity,
};
use crate::ledger::{CustomerLedger, LedgerState};
use crate::profile::ChurnThresholds;

/// Usage drop percentage below which the signal does not qualify.
const USAGE_DROP_QUALIFYING_PCT: f64 = 30.0;

/// Days without payment at which the inactivity signal qualifies.
const INACTIVITY_QUALIFYING_DAYS: i64 = 35;

/// Days over which inactivity weight saturates.
const INACTIVITY_SATURATION_DAYS: f64 = 90.0;

/// Days defining a "recent" plan downgrade.
const DOWNGRADE_RECENCY_DAYS: i64 = 30;

/// Scores churn risk for every customer in the ledger with at least one
/// qualifying signal.
///
/// The reference date for recency windows comes from the inputs envelope,
/// defaulting to the ledger window end. Output is sorted by score
/// descending with ties broken by customer id ascending.
#[must_use]
pub fn score(
    ledger: &LedgerState,
    inputs: &ChurnInputs,
    thresholds: &ChurnThresholds,
) -> Vec<ChurnRisk> {
    let reference_date = inputs.reference_date.unwrap_or(ledger.period_end);

    let mut usage_by_customer: BTreeMap<&str, f64> = BTreeMap::new();
    for metric in &inputs.usage_metrics {
        let drop = metric.drop_pct();
        if drop > USAGE_DROP_QUALIFYING_PCT {
            let entry = usage_by_customer
                .entry(metric.customer_id.as_str())
                .or_insert(0.0);
            if drop > *entry {
                *entry = drop;
            }
        }
    }

    let mut risks = Vec::new();
    for customer in ledger.customers.values() {
        let mut signals = Vec::new();

        if let Some(signal) = payment_failures_signal(customer, thresholds) {
            signals.push(signal);
        }
        if let Some(drop) = usage_by_customer.get(customer.customer_id.as_str()) {
            signals.push(ChurnSignal {
                signal_type: ChurnSignalType::UsageDrop,
                weight: thresholds.usage_drop_weight * (drop / 100.0).min(1.0),
                detail: format!("usage dropped {drop:.0}% against the previous period"),
            });
        }
        if let Some(signal) = support_tickets_signal(customer, inputs, thresholds) {
            signals.push(signal);
        }
        if let Some(signal) =
            plan_downgrade_signal(customer, inputs, thresholds, reference_date)
        {
            signals.push(signal);
        }
        if let Some(signal) = inactivity_signal(customer, thresholds, reference_date) {
            signals.push(signal);
        }

        if signals.is_empty() {
            continue;
        }
        risks.push(assemble(customer, signals, ledger, thresholds));
    }

    risks.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    debug!(scored = risks.len(), "churn scoring complete");
    risks
}

fn payment_failures_signal(
    customer: &CustomerLedger,
    thresholds: &ChurnThresholds,
) -> Option<ChurnSignal> {
    if customer.payment_failure_count_30d == 0 {
        return None;
    }
    let count = f64::from(customer.payment_failure_count_30d);
    let weight = (thresholds.payment_failure_weight * (count * 0.2).min(2.0)).min(0.9);
    Some(ChurnSignal {
        signal_type: ChurnSignalType::PaymentFailures,
        weight,
        detail: format!(
            "{} payment failures in the last 30 days",
            customer.payment_failure_count_30d
        ),
    })
}

fn support_tickets_signal(
    customer: &CustomerLedger,
    inputs: &ChurnInputs,
    thresholds: &ChurnThresholds,
) -> Option<ChurnSignal> {
    let tickets: Vec<_> = inputs
        .support_tickets
        .iter()
        .filter(|t| t.customer_id == customer.customer_id)
        .collect();
    if tickets.is_empty() {
        return None;
    }
    let open_count = tickets.iter().filter(|t| t.open).count();
    let has_high = tickets.iter().any(|t| t.severity == TicketSeverity::High);
    let has_critical = tickets
        .iter()
        .any(|t| t.severity == TicketSeverity::Critical);
    let severity_multiplier = if has_critical {
        2.0
    } else if has_high {
        1.5
    } else if open_count >= 3 {
        1.3
    } else {
        1.0
    };
    #[allow(clippy::cast_precision_loss)]
    let count = tickets.len() as f64;
    let weight =
        (thresholds.support_ticket_weight * severity_multiplier * count.sqrt()).min(0.9);
    Some(ChurnSignal {
        signal_type: ChurnSignalType::SupportTickets,
        weight,
        detail: format!(
            "{} support tickets ({open_count} open)",
            tickets.len()
        ),
    })
}

fn plan_downgrade_signal(
    customer: &CustomerLedger,
    inputs: &ChurnInputs,
    thresholds: &ChurnThresholds,
    reference_date: DateTime<Utc>,
) -> Option<ChurnSignal> {
    #[allow(clippy::cast_precision_loss)]
    let recent = inputs
        .plan_downgrades
        .iter()
        .filter(|d| d.customer_id == customer.customer_id)
        .filter(|d| {
            d.occurred_at <= reference_date
                && (reference_date - d.occurred_at).num_days() <= DOWNGRADE_RECENCY_DAYS
        })
        .count() as f64;
    if recent == 0.0 {
        return None;
    }
    let weight = (thresholds.downgrade_weight * (1.0 + recent * 0.5)).min(0.8);
    Some(ChurnSignal {
        signal_type: ChurnSignalType::PlanDowngrade,
        weight,
        detail: format!("{recent:.0} plan downgrade(s) in the last 30 days"),
    })
}

fn inactivity_signal(
    customer: &CustomerLedger,
    thresholds: &ChurnThresholds,
    reference_date: DateTime<Utc>,
) -> Option<ChurnSignal> {
    if customer.total_mrr_cents == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let days = match customer.last_payment_at {
        Some(last) => (reference_date - last).num_days() as f64,
        // Never paid: saturate the signal.
        None => INACTIVITY_SATURATION_DAYS,
    };
    if days < INACTIVITY_QUALIFYING_DAYS as f64 {
        return None;
    }
    let weight = thresholds.inactivity_weight * (days / INACTIVITY_SATURATION_DAYS).min(1.0);
    Some(ChurnSignal {
        signal_type: ChurnSignalType::Inactivity,
        weight,
        detail: format!("{days:.0} days since last successful payment"),
    })
}

fn assemble(
    customer: &CustomerLedger,
    mut signals: Vec<ChurnSignal>,
    ledger: &LedgerState,
    thresholds: &ChurnThresholds,
) -> ChurnRisk {
    signals.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.signal_type.cmp(&b.signal_type))
    });

    let raw: f64 = signals.iter().map(|s| s.weight * 100.0).sum();
    // Corroborating signals amplify each other.
    #[allow(clippy::cast_precision_loss)]
    let amplifier = 1.0 + 0.1 * (signals.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let risk_score = (raw * amplifier).min(100.0).round() as u32;

    let risk_level = if risk_score >= thresholds.critical_score {
        RiskLevel::Critical
    } else if risk_score >= thresholds.high_score {
        RiskLevel::High
    } else if risk_score >= thresholds.medium_score {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let explanation = format!(
        "risk driven by: {}",
        signals
            .iter()
            .map(|s| s.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    );
    let mut recommended_actions: Vec<String> = signals
        .iter()
        .map(|s| action_for(s.signal_type).to_string())
        .collect();
    if risk_level >= RiskLevel::High {
        recommended_actions.push("Flag account for retention review".to_string());
    }

    ChurnRisk {
        customer_id: customer.customer_id.clone(),
        tenant_id: ledger.tenant_id.clone(),
        project_id: ledger.project_id.clone(),
        risk_score,
        risk_level,
        signals,
        explanation,
        recommended_actions,
    }
}

const fn action_for(signal_type: ChurnSignalType) -> &'static str {
    match signal_type {
        ChurnSignalType::PaymentFailures => "Review failing payment method and retry schedule",
        ChurnSignalType::UsageDrop => "Schedule a usage review with the customer",
        ChurnSignalType::SupportTickets => "Escalate open support tickets to the account team",
        ChurnSignalType::PlanDowngrade => "Offer a plan consultation to recover downgraded revenue",
        ChurnSignalType::Inactivity => "Trigger re-engagement outreach",
    }
}
