//! MRR reconciliation: expected vs. observed recurring revenue.
//!
//! For every non-canceled subscription, expected MRR is the ledger's
//! `mrr_cents` and observed MRR is `min(expected, customer.total_paid_cents)`
//! — a simplified observed-revenue proxy. The proxy cannot distinguish a
//! customer paying for multiple subscriptions from one overpaying on a
//! single subscription; it is preserved as-is rather than silently
//! improved.
//!
//! Report-level totals are independent sums, not derived from the
//! discrepancy list, so the two can be cross-checked. The report hash is
//! computed over a reduced tuple set — (subscription_id, difference_cents,
//! reason) plus the window identity — deliberately excluding full
//! discrepancy objects and timestamps so hash stability does not depend on
//! incidental fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::canonical;
use crate::events::{EventType, NormalizedEvent};
use crate::ledger::{LedgerState, Period};

/// Tolerance below which an expected/observed delta is not a discrepancy.
pub const DISCREPANCY_TOLERANCE_CENTS: i64 = 100;

/// Classified cause of an MRR discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyReason {
    /// Expected revenue exceeds observed payments.
    MissingInvoice,
    /// Observed payments exceed expected revenue.
    DoubleCharge,
    /// Payment failures with no successful payment at all.
    MissingPayment,
}

/// A single expected-vs-observed delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MrrDiscrepancy {
    /// Subscription the delta belongs to; `None` for the synthetic
    /// missing-payment case, which is customer-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Owning customer.
    pub customer_id: String,
    /// Ledger-derived expected MRR in cents.
    pub expected_mrr_cents: i64,
    /// Observed revenue proxy in cents.
    pub observed_mrr_cents: i64,
    /// `expected - observed`.
    pub difference_cents: i64,
    /// Classified cause.
    pub reason: DiscrepancyReason,
}

/// Reconciliation report for one tenant/project window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconReport {
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Window start.
    pub period_start: DateTime<Utc>,
    /// Window end.
    pub period_end: DateTime<Utc>,
    /// When the report was generated (stable sentinel under stable output).
    pub generated_at: DateTime<Utc>,
    /// Sum of expected MRR over non-canceled subscriptions.
    pub expected_total_cents: i64,
    /// Sum of the observed proxy over non-canceled subscriptions.
    pub observed_total_cents: i64,
    /// `expected_total - observed_total`.
    pub total_difference_cents: i64,
    /// Number of discrepancies.
    pub discrepancy_count: usize,
    /// Whether the window reconciles cleanly.
    pub is_balanced: bool,
    /// Individual discrepancies.
    pub discrepancies: Vec<MrrDiscrepancy>,
    /// Content hash over the reduced discrepancy tuple set.
    pub report_hash: String,
}

/// Net charge totals for one window, bucketed by category.
///
/// Paid invoices attached to a subscription count as subscription revenue;
/// paid invoices without one count as usage charges. Refunds carry a
/// negative sign, so `total_cents` is net revenue for the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cents paid against subscription-linked invoices.
    pub subscription_cents: i64,
    /// Cents paid against invoices with no subscription.
    pub usage_cents: i64,
    /// Refunded cents, negated.
    pub refund_cents: i64,
    /// `subscription + usage + refund`.
    pub total_cents: i64,
}

/// Aggregates in-window paid and refunded amounts into a cost snapshot.
///
/// Events outside the window are ignored, matching the ledger builder's
/// scoping.
#[must_use]
pub fn cost_breakdown(events: &[NormalizedEvent], period: &Period) -> CostBreakdown {
    let mut breakdown = CostBreakdown::default();
    for normalized in events {
        let event = &normalized.event;
        if !period.contains(event.timestamp) {
            continue;
        }
        let amount = event.amount_cents.unwrap_or(0);
        match event.event_type {
            EventType::InvoicePaid => {
                if event.subscription_id.is_some() {
                    breakdown.subscription_cents += amount;
                } else {
                    breakdown.usage_cents += amount;
                }
            },
            EventType::InvoiceRefunded => {
                breakdown.refund_cents -= amount;
            },
            _ => {},
        }
    }
    breakdown.total_cents =
        breakdown.subscription_cents + breakdown.usage_cents + breakdown.refund_cents;
    breakdown
}

/// Errors raised during reconciliation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReconError {
    /// The constructed report violated its own shape. A programming error;
    /// reconciliation aborts.
    #[error("reconciliation output shape violation: {detail}")]
    OutputShape {
        /// Description of the broken invariant.
        detail: String,
    },

    /// The report hash could not be computed.
    #[error("report hash failed: {0}")]
    Hash(#[from] canonical::CanonicalError),
}

/// Reconciles a ledger into a discrepancy report.
///
/// # Errors
///
/// Returns [`ReconError::OutputShape`] if the constructed report fails its
/// own shape check.
pub fn reconcile(
    ledger: &LedgerState,
    generated_at: DateTime<Utc>,
) -> Result<ReconReport, ReconError> {
    let mut discrepancies = Vec::new();
    let mut expected_total = 0i64;
    let mut observed_total = 0i64;

    for customer in ledger.customers.values() {
        for subscription in &customer.subscriptions {
            if subscription.status.is_canceled() {
                continue;
            }
            let expected = subscription.mrr_cents;
            let observed = expected.min(customer.total_paid_cents);
            expected_total += expected;
            observed_total += observed;

            let difference = expected - observed;
            if difference.abs() > DISCREPANCY_TOLERANCE_CENTS {
                let reason = if expected > observed {
                    DiscrepancyReason::MissingInvoice
                } else {
                    DiscrepancyReason::DoubleCharge
                };
                discrepancies.push(MrrDiscrepancy {
                    subscription_id: Some(subscription.subscription_id.clone()),
                    customer_id: customer.customer_id.clone(),
                    expected_mrr_cents: expected,
                    observed_mrr_cents: observed,
                    difference_cents: difference,
                    reason,
                });
            }
        }

        // Customers that only ever failed to pay surface as a synthetic
        // missing-payment discrepancy.
        if customer.payment_failure_count_30d > 0
            && customer.last_payment_at.is_none()
            && customer.total_paid_cents == 0
        {
            discrepancies.push(MrrDiscrepancy {
                subscription_id: None,
                customer_id: customer.customer_id.clone(),
                expected_mrr_cents: customer.total_mrr_cents,
                observed_mrr_cents: 0,
                difference_cents: customer.total_mrr_cents,
                reason: DiscrepancyReason::MissingPayment,
            });
        }
    }

    let total_difference = expected_total - observed_total;
    let is_balanced = total_difference == 0 && discrepancies.is_empty();
    let report_hash = hash_report(ledger, &discrepancies)?;

    let report = ReconReport {
        tenant_id: ledger.tenant_id.clone(),
        project_id: ledger.project_id.clone(),
        period_start: ledger.period_start,
        period_end: ledger.period_end,
        generated_at,
        expected_total_cents: expected_total,
        observed_total_cents: observed_total,
        total_difference_cents: total_difference,
        discrepancy_count: discrepancies.len(),
        is_balanced,
        discrepancies,
        report_hash,
    };
    validate_output(&report)?;

    debug!(
        discrepancies = report.discrepancy_count,
        total_difference_cents = report.total_difference_cents,
        is_balanced = report.is_balanced,
        "reconciliation complete"
    );
    Ok(report)
}

fn hash_report(
    ledger: &LedgerState,
    discrepancies: &[MrrDiscrepancy],
) -> Result<String, canonical::CanonicalError> {
    let reduced: Vec<_> = discrepancies
        .iter()
        .map(|d| {
            json!({
                "subscription_id": d.subscription_id,
                "difference_cents": d.difference_cents,
                "reason": d.reason,
            })
        })
        .collect();
    canonical::content_hash(&json!({
        "tenant_id": ledger.tenant_id,
        "project_id": ledger.project_id,
        "period_start": ledger.period_start.to_rfc3339(),
        "period_end": ledger.period_end.to_rfc3339(),
        "discrepancies": reduced,
    }))
}

fn validate_output(report: &ReconReport) -> Result<(), ReconError> {
    if report.discrepancy_count != report.discrepancies.len() {
        return Err(ReconError::OutputShape {
            detail: format!(
                "discrepancy_count {} does not match list length {}",
                report.discrepancy_count,
                report.discrepancies.len()
            ),
        });
    }
    if report.is_balanced
        && (report.total_difference_cents != 0 || !report.discrepancies.is_empty())
    {
        return Err(ReconError::OutputShape {
            detail: "is_balanced set on an unbalanced report".to_string(),
        });
    }
    if report.report_hash.len() != 64 {
        return Err(ReconError::OutputShape {
            detail: "report hash is not a sha256 hex digest".to_string(),
        });
    }
    Ok(())
}
