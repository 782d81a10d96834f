//! The detector battery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::warn;

use super::types::{Anomaly, AnomalyType, Severity};
use crate::canonical;
use crate::events::{EventType, NormalizedEvent};
use crate::ledger::LedgerState;
use crate::profile::AnomalyThresholds;

/// Runs all detectors over one window and returns the combined anomaly
/// list.
///
/// Only events inside the ledger's window are considered, matching the
/// ledger's own scoping. Detector order is fixed and iteration is over
/// ordered containers, so output order is deterministic.
#[must_use]
pub fn detect(
    events: &[NormalizedEvent],
    ledger: &LedgerState,
    thresholds: &AnomalyThresholds,
    detected_at: DateTime<Utc>,
) -> Vec<Anomaly> {
    let in_window: Vec<&NormalizedEvent> = events
        .iter()
        .filter(|e| {
            e.event.timestamp >= ledger.period_start && e.event.timestamp <= ledger.period_end
        })
        .collect();

    let mut out = Vec::new();
    duplicate_events(&in_window, ledger, thresholds, detected_at, &mut out);
    missing_invoices(&in_window, ledger, detected_at, &mut out);
    double_charges(&in_window, ledger, detected_at, &mut out);
    refund_spike(&in_window, ledger, thresholds, detected_at, &mut out);
    dispute_spike(&in_window, ledger, thresholds, detected_at, &mut out);
    payment_failure_spike(ledger, thresholds, detected_at, &mut out);
    out_of_sequence(&in_window, ledger, detected_at, &mut out);

    // Best-effort per item: drop records failing their own shape check.
    out.retain(|anomaly| {
        if anomaly.is_well_formed() {
            true
        } else {
            warn!(anomaly_id = %anomaly.anomaly_id, "dropping malformed anomaly record");
            false
        }
    });
    out
}

/// Deterministic anomaly id: type prefix plus 16 hex chars of the content
/// hash of (type, tenant, project, discriminating key).
fn anomaly_id(anomaly_type: AnomalyType, ledger: &LedgerState, key: &str) -> String {
    let short = canonical::short_hash(&json!([
        anomaly_type.as_str(),
        ledger.tenant_id,
        ledger.project_id,
        key,
    ]))
    .unwrap_or_default();
    format!("{}_{short}", anomaly_type.as_str())
}

fn record(
    anomaly_type: AnomalyType,
    ledger: &LedgerState,
    key: &str,
    severity: Severity,
    confidence: f64,
    description: String,
    affected_events: Vec<String>,
    metadata: BTreeMap<String, Value>,
    detected_at: DateTime<Utc>,
) -> Anomaly {
    Anomaly {
        anomaly_id: anomaly_id(anomaly_type, ledger, key),
        anomaly_type,
        tenant_id: ledger.tenant_id.clone(),
        project_id: ledger.project_id.clone(),
        severity,
        confidence,
        description,
        affected_events,
        detected_at,
        metadata,
    }
}

/// Same event id observed twice within the duplicate window.
fn duplicate_events(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    thresholds: &AnomalyThresholds,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    let mut by_id: BTreeMap<&str, Vec<&NormalizedEvent>> = BTreeMap::new();
    for event in events {
        by_id.entry(event.event.event_id.as_str()).or_default().push(event);
    }
    for (event_id, occurrences) in by_id {
        // Occurrences are already chronological; one anomaly per adjacent
        // pair inside the window.
        for (i, pair) in occurrences.windows(2).enumerate() {
            let gap = (pair[1].event.timestamp - pair[0].event.timestamp).num_seconds();
            if gap <= thresholds.duplicate_window_seconds {
                out.push(record(
                    AnomalyType::DuplicateEvent,
                    ledger,
                    &format!("{event_id}:{i}"),
                    Severity::High,
                    1.0,
                    format!("event {event_id} observed twice {gap}s apart"),
                    vec![event_id.to_string()],
                    BTreeMap::from([
                        ("gap_seconds".to_string(), json!(gap)),
                        ("occurrences".to_string(), json!(occurrences.len())),
                    ]),
                    detected_at,
                ));
            }
        }
    }
}

/// Active revenue-bearing subscription with no invoice activity in-window.
fn missing_invoices(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    for customer in ledger.customers.values() {
        for subscription in &customer.subscriptions {
            if !subscription.status.is_active() || subscription.mrr_cents == 0 {
                continue;
            }
            let has_invoice_activity = events.iter().any(|e| {
                e.event.event_type.is_invoice()
                    && e.event.subscription_id.as_deref() == Some(&subscription.subscription_id)
            });
            if !has_invoice_activity {
                out.push(record(
                    AnomalyType::MissingInvoice,
                    ledger,
                    &subscription.subscription_id,
                    Severity::Medium,
                    0.8,
                    format!(
                        "active subscription {} ({} cents MRR) has no invoice events in-period",
                        subscription.subscription_id, subscription.mrr_cents
                    ),
                    Vec::new(),
                    BTreeMap::from([
                        ("customer_id".to_string(), json!(customer.customer_id)),
                        ("mrr_cents".to_string(), json!(subscription.mrr_cents)),
                    ]),
                    detected_at,
                ));
            }
        }
    }
}

/// Two or more payments sharing an invoice id and amount.
fn double_charges(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    let mut by_invoice: BTreeMap<(String, i64), Vec<&NormalizedEvent>> = BTreeMap::new();
    for event in events {
        if !event.event.event_type.is_payment() {
            continue;
        }
        let (Some(invoice_id), Some(amount)) =
            (event.event.invoice_id.clone(), event.event.amount_cents)
        else {
            continue;
        };
        by_invoice.entry((invoice_id, amount)).or_default().push(event);
    }
    for ((invoice_id, amount), payments) in by_invoice {
        if payments.len() < 2 {
            continue;
        }
        let total: i64 = payments
            .iter()
            .map(|e| e.event.amount_cents.unwrap_or(0))
            .sum();
        out.push(record(
            AnomalyType::DoubleCharge,
            ledger,
            &format!("{invoice_id}:{amount}"),
            Severity::Critical,
            0.9,
            format!(
                "invoice {invoice_id} paid {} times at {amount} cents each",
                payments.len()
            ),
            payments.iter().map(|e| e.event.event_id.clone()).collect(),
            BTreeMap::from([
                ("invoice_id".to_string(), json!(invoice_id)),
                ("amount_cents".to_string(), json!(amount)),
                ("difference_cents".to_string(), json!(total - amount)),
            ]),
            detected_at,
        ));
    }
}

/// Refund totals exceeding the absolute threshold.
fn refund_spike(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    thresholds: &AnomalyThresholds,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    let refunds: i64 = events
        .iter()
        .filter(|e| e.event.event_type == EventType::InvoiceRefunded)
        .filter_map(|e| e.event.amount_cents)
        .sum();
    if refunds <= thresholds.refund_spike_cents {
        return;
    }
    let revenue: i64 = events
        .iter()
        .filter(|e| e.event.event_type == EventType::InvoicePaid)
        .filter_map(|e| e.event.amount_cents)
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let pct = if revenue > 0 {
        refunds as f64 / revenue as f64 * 100.0
    } else {
        100.0
    };
    let severity = if pct > thresholds.refund_spike_pct {
        Severity::Critical
    } else {
        Severity::High
    };
    let affected: Vec<String> = events
        .iter()
        .filter(|e| e.event.event_type == EventType::InvoiceRefunded)
        .map(|e| e.event.event_id.clone())
        .collect();
    out.push(record(
        AnomalyType::RefundSpike,
        ledger,
        &ledger.period_start.to_rfc3339(),
        severity,
        (pct / thresholds.refund_spike_pct).min(1.0),
        format!(
            "refunds of {refunds} cents exceed the {} cent threshold",
            thresholds.refund_spike_cents
        ),
        affected,
        BTreeMap::from([
            ("refund_total_cents".to_string(), json!(refunds)),
            ("revenue_total_cents".to_string(), json!(revenue)),
            ("refund_pct".to_string(), json!(pct)),
        ]),
        detected_at,
    ));
}

/// Dispute-event count at or above the threshold.
fn dispute_spike(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    thresholds: &AnomalyThresholds,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    let disputes: Vec<&&NormalizedEvent> = events
        .iter()
        .filter(|e| e.event.event_type == EventType::InvoiceDisputed)
        .collect();
    if disputes.len() < thresholds.dispute_count {
        return;
    }
    let severity = if disputes.len() > thresholds.dispute_count * 2 {
        Severity::Critical
    } else {
        Severity::High
    };
    #[allow(clippy::cast_precision_loss)]
    let confidence = (disputes.len() as f64 / (thresholds.dispute_count * 2) as f64).min(1.0);
    out.push(record(
        AnomalyType::DisputeSpike,
        ledger,
        &ledger.period_start.to_rfc3339(),
        severity,
        confidence,
        format!(
            "{} disputes in-period (threshold {})",
            disputes.len(),
            thresholds.dispute_count
        ),
        disputes.iter().map(|e| e.event.event_id.clone()).collect(),
        BTreeMap::from([("dispute_count".to_string(), json!(disputes.len()))]),
        detected_at,
    ));
}

/// Per-customer payment failure rate at or above the threshold.
fn payment_failure_spike(
    ledger: &LedgerState,
    thresholds: &AnomalyThresholds,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    for customer in ledger.customers.values() {
        let failures = f64::from(customer.payment_failure_count_30d);
        if failures == 0.0 {
            continue;
        }
        let has_paid =
            if customer.total_paid_cents > 0 || customer.last_payment_at.is_some() {
                1.0
            } else {
                0.0
            };
        let rate = failures / (failures + has_paid);
        if rate < thresholds.payment_failure_rate {
            continue;
        }
        let severity = if rate > 0.5 {
            Severity::Critical
        } else {
            Severity::High
        };
        out.push(record(
            AnomalyType::PaymentFailureSpike,
            ledger,
            &customer.customer_id,
            severity,
            rate.min(1.0),
            format!(
                "customer {} failure rate {:.2} over {} failures",
                customer.customer_id, rate, customer.payment_failure_count_30d
            ),
            Vec::new(),
            BTreeMap::from([
                ("failure_count".to_string(), json!(customer.payment_failure_count_30d)),
                ("failure_rate".to_string(), json!(rate)),
            ]),
            detected_at,
        ));
    }
}

/// Chronologically impossible per-subscription sequences.
fn out_of_sequence(
    events: &[&NormalizedEvent],
    ledger: &LedgerState,
    detected_at: DateTime<Utc>,
    out: &mut Vec<Anomaly>,
) {
    let mut by_subscription: BTreeMap<&str, Vec<&NormalizedEvent>> = BTreeMap::new();
    for event in events {
        if let Some(id) = event.event.subscription_id.as_deref() {
            by_subscription.entry(id).or_default().push(event);
        }
    }
    for (subscription_id, sequence) in by_subscription {
        let mut seen_created = false;
        let mut canceled = false;
        for event in sequence {
            match event.event.event_type {
                EventType::SubscriptionCreated => seen_created = true,
                EventType::SubscriptionCancelled => {
                    if !seen_created && !canceled {
                        out.push(record(
                            AnomalyType::OutOfSequence,
                            ledger,
                            &format!("{subscription_id}:cancel_before_create"),
                            Severity::Medium,
                            0.85,
                            format!(
                                "subscription {subscription_id} cancelled before any creation event"
                            ),
                            vec![event.event.event_id.clone()],
                            BTreeMap::new(),
                            detected_at,
                        ));
                    }
                    canceled = true;
                },
                t if t.is_payment() && canceled => {
                    out.push(record(
                        AnomalyType::OutOfSequence,
                        ledger,
                        &format!("{subscription_id}:payment_after_cancel:{}", event.event.event_id),
                        Severity::Low,
                        0.7,
                        format!(
                            "payment {} recorded after subscription {subscription_id} was cancelled",
                            event.event.event_id
                        ),
                        vec![event.event.event_id.clone()],
                        BTreeMap::new(),
                        detected_at,
                    ));
                },
                _ => {},
            }
        }
    }
}
