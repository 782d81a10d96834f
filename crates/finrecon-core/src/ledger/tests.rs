//! Ledger builder battery.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::*;
use crate::events::{NormalizedEvent, NormalizerOptions, TenantContext, normalize};

fn ctx() -> TenantContext {
    TenantContext::new("acme", "prod")
}

fn ts(text: &str) -> DateTime<Utc> {
    text.parse().unwrap()
}

fn january() -> Period {
    Period {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-31T23:59:59Z"),
    }
}

fn events(records: Vec<Value>) -> Vec<NormalizedEvent> {
    normalize(
        &records,
        &ctx(),
        NormalizerOptions::default(),
        ts("2024-02-01T00:00:00Z"),
    )
    .events
}

fn created(event_id: &str, sub: &str, cents: i64, timestamp: &str) -> Value {
    json!({
        "event_id": event_id,
        "event_type": "subscription_created",
        "timestamp": timestamp,
        "customer_id": "cus_1",
        "subscription_id": sub,
        "amount_cents": cents,
        "plan_id": "pro"
    })
}

fn cancelled(event_id: &str, sub: &str, timestamp: &str) -> Value {
    json!({
        "event_id": event_id,
        "event_type": "subscription_cancelled",
        "timestamp": timestamp,
        "customer_id": "cus_1",
        "subscription_id": sub
    })
}

fn build(records: Vec<Value>) -> LedgerState {
    LedgerBuilder::new(ctx(), january())
        .build(&events(records), ts("2024-02-01T00:00:00Z"))
        .unwrap()
}

#[test]
fn created_subscription_contributes_mrr() {
    let state = build(vec![created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z")]);
    assert_eq!(state.total_mrr_cents, 5000);
    assert_eq!(state.active_subscriptions, 1);
    assert_eq!(state.total_customers, 1);
    assert_eq!(state.event_count, 1);
    let sub = state.customers["cus_1"].subscription("sub_1").unwrap();
    assert_eq!(sub.plan_id, "pro");
    assert_eq!(sub.currency, "USD");
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[test]
fn cancellation_dominates_regardless_of_order() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        cancelled("evt_2", "sub_1", "2024-01-15T00:00:00Z"),
    ]);
    assert_eq!(state.active_subscriptions, 0);
    assert_eq!(state.total_mrr_cents, 0);
    let sub = state.customers["cus_1"].subscription("sub_1").unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Canceled);
    assert_eq!(sub.canceled_at, Some(ts("2024-01-15T00:00:00Z")));
}

#[test]
fn canceled_subscription_is_not_resurrected_by_later_events() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        cancelled("evt_2", "sub_1", "2024-01-10T00:00:00Z"),
        json!({
            "event_id": "evt_3",
            "event_type": "subscription_resumed",
            "timestamp": "2024-01-20T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1"
        }),
    ]);
    let sub = state.customers["cus_1"].subscription("sub_1").unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Canceled);
}

#[test]
fn out_of_window_events_never_touch_state() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        // December cancellation is outside the January window.
        cancelled("evt_0", "sub_1", "2023-12-15T00:00:00Z"),
        // February payment is outside too.
        json!({
            "event_id": "evt_2",
            "event_type": "invoice_paid",
            "timestamp": "2024-02-05T00:00:00Z",
            "customer_id": "cus_1",
            "amount_cents": 5000
        }),
    ]);
    assert_eq!(state.event_count, 1);
    assert_eq!(state.active_subscriptions, 1);
    assert_eq!(state.customers["cus_1"].total_paid_cents, 0);
}

#[test]
fn update_merges_fields_in_place() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "subscription_updated",
            "timestamp": "2024-01-10T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1",
            "amount_cents": 7500,
            "plan_id": "enterprise",
            "currency": "EUR"
        }),
    ]);
    let sub = state.customers["cus_1"].subscription("sub_1").unwrap();
    assert_eq!(sub.mrr_cents, 7500);
    assert_eq!(sub.plan_id, "enterprise");
    assert_eq!(sub.currency, "EUR");
    assert_eq!(state.total_mrr_cents, 7500);
}

#[test]
fn update_of_unknown_subscription_is_a_no_op() {
    let state = build(vec![json!({
        "event_id": "evt_1",
        "event_type": "subscription_updated",
        "timestamp": "2024-01-10T00:00:00Z",
        "customer_id": "cus_1",
        "subscription_id": "sub_ghost",
        "amount_cents": 7500
    })]);
    assert!(state.customers["cus_1"].subscriptions.is_empty());
    assert_eq!(state.event_count, 1);
}

#[test]
fn payment_and_invoice_events_update_running_totals() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "invoice_paid",
            "timestamp": "2024-01-02T00:00:00Z",
            "customer_id": "cus_1",
            "invoice_id": "inv_1",
            "amount_cents": 5000
        }),
        json!({
            "event_id": "evt_3",
            "event_type": "invoice_refunded",
            "timestamp": "2024-01-03T00:00:00Z",
            "customer_id": "cus_1",
            "invoice_id": "inv_1",
            "amount_cents": 1000
        }),
        json!({
            "event_id": "evt_4",
            "event_type": "invoice_disputed",
            "timestamp": "2024-01-04T00:00:00Z",
            "customer_id": "cus_1",
            "invoice_id": "inv_1",
            "amount_cents": 500
        }),
        json!({
            "event_id": "evt_5",
            "event_type": "payment_succeeded",
            "timestamp": "2024-01-05T00:00:00Z",
            "customer_id": "cus_1"
        }),
        json!({
            "event_id": "evt_6",
            "event_type": "payment_failed",
            "timestamp": "2024-01-06T00:00:00Z",
            "customer_id": "cus_1"
        }),
    ]);
    let customer = &state.customers["cus_1"];
    assert_eq!(customer.total_paid_cents, 5000);
    assert_eq!(customer.total_refunded_cents, 1000);
    assert_eq!(customer.total_disputed_cents, 500);
    assert_eq!(customer.payment_failure_count_30d, 1);
    assert_eq!(customer.last_invoice_at, Some(ts("2024-01-02T00:00:00Z")));
    assert_eq!(customer.last_payment_at, Some(ts("2024-01-05T00:00:00Z")));
}

#[test]
fn paid_invoice_counts_as_payment_activity() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "invoice_paid",
            "timestamp": "2024-01-02T00:00:00Z",
            "customer_id": "cus_1",
            "invoice_id": "inv_1",
            "amount_cents": 5000
        }),
    ]);
    // No standalone payment_succeeded event, yet the customer has paid.
    let customer = &state.customers["cus_1"];
    assert_eq!(customer.last_payment_at, Some(ts("2024-01-02T00:00:00Z")));
    assert_eq!(customer.last_invoice_at, Some(ts("2024-01-02T00:00:00Z")));
}

#[test]
fn payment_failure_marks_active_subscription_past_due() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "invoice_payment_failed",
            "timestamp": "2024-01-05T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1"
        }),
    ]);
    let customer = &state.customers["cus_1"];
    assert_eq!(customer.payment_failure_count_30d, 1);
    assert_eq!(
        customer.subscription("sub_1").unwrap().status,
        SubscriptionStatus::PastDue
    );
    // Past-due subscriptions do not contribute to MRR.
    assert_eq!(state.total_mrr_cents, 0);
}

#[test]
fn pause_and_resume_toggle_active_status() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "subscription_paused",
            "timestamp": "2024-01-05T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1"
        }),
    ]);
    assert_eq!(state.active_subscriptions, 0);
    assert_eq!(state.total_mrr_cents, 0);

    let resumed = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        json!({
            "event_id": "evt_2",
            "event_type": "subscription_paused",
            "timestamp": "2024-01-05T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1"
        }),
        json!({
            "event_id": "evt_3",
            "event_type": "subscription_resumed",
            "timestamp": "2024-01-08T00:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1"
        }),
    ]);
    assert_eq!(resumed.active_subscriptions, 1);
    assert_eq!(resumed.total_mrr_cents, 5000);
}

#[test]
fn rebuilding_is_idempotent() {
    let records = vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        created("evt_2", "sub_2", 3000, "2024-01-02T00:00:00Z"),
        cancelled("evt_3", "sub_2", "2024-01-20T00:00:00Z"),
    ];
    let first = build(records.clone());
    let second = build(records);
    assert_eq!(first.total_mrr_cents, second.total_mrr_cents);
    assert_eq!(first.total_customers, second.total_customers);
    assert_eq!(first.active_subscriptions, second.active_subscriptions);
    assert_eq!(first.event_count, second.event_count);
    assert_eq!(first, second);
}

#[test]
fn duplicate_create_does_not_double_count() {
    let state = build(vec![
        created("evt_1", "sub_1", 5000, "2024-01-01T00:00:00Z"),
        created("evt_2", "sub_1", 5000, "2024-01-01T01:00:00Z"),
    ]);
    assert_eq!(state.active_subscriptions, 1);
    assert_eq!(state.total_mrr_cents, 5000);
    assert_eq!(state.customers["cus_1"].subscriptions.len(), 1);
}

#[test]
fn missing_amount_defaults_to_zero_mrr() {
    let state = build(vec![json!({
        "event_id": "evt_1",
        "event_type": "subscription_created",
        "timestamp": "2024-01-01T00:00:00Z",
        "customer_id": "cus_1",
        "subscription_id": "sub_1"
    })]);
    let sub = state.customers["cus_1"].subscription("sub_1").unwrap();
    assert_eq!(sub.mrr_cents, 0);
    assert_eq!(sub.plan_id, "unknown");
    assert_eq!(state.total_mrr_cents, 0);
    assert_eq!(state.active_subscriptions, 1);
}

#[test]
fn inverted_period_is_rejected() {
    let builder = LedgerBuilder::new(
        ctx(),
        Period {
            start: ts("2024-02-01T00:00:00Z"),
            end: ts("2024-01-01T00:00:00Z"),
        },
    );
    let err = builder.build(&[], ts("2024-02-01T00:00:00Z")).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPeriod { .. }));
}
