//! End-to-end determinism and invariance checks over a realistic batch.

use finrecon_core::churn::{ChurnInputs, SupportTicket, TicketSeverity, UsageMetric};
use finrecon_core::forge::validate_bundle;
use finrecon_core::pipeline::{self, PipelineConfig};
use serde_json::{Value, json};

fn config() -> PipelineConfig {
    PipelineConfig {
        tenant_id: "acme".to_string(),
        project_id: "billing_prod".to_string(),
        period_start: "2024-03-01T00:00:00Z".parse().unwrap(),
        period_end: "2024-03-31T23:59:59Z".parse().unwrap(),
        profile_id: "base".to_string(),
        skip_validation: false,
        stable_output: true,
    }
}

fn batch() -> Vec<Value> {
    vec![
        json!({
            "event_id": "evt_001",
            "event_type": "subscription_created",
            "timestamp": "2024-03-01T08:00:00Z",
            "customer_id": "cus_alpha",
            "subscription_id": "sub_alpha",
            "plan_id": "plan_pro",
            "amount_cents": 9900
        }),
        json!({
            "event_id": "evt_002",
            "event_type": "invoice_created",
            "timestamp": "2024-03-01T08:05:00Z",
            "customer_id": "cus_alpha",
            "invoice_id": "inv_alpha_1",
            "amount_cents": 9900
        }),
        json!({
            "event_id": "evt_003",
            "event_type": "invoice_paid",
            "timestamp": "2024-03-01T09:00:00Z",
            "customer_id": "cus_alpha",
            "invoice_id": "inv_alpha_1",
            "amount_cents": 9900
        }),
        json!({
            "event_id": "evt_004",
            "event_type": "subscription_created",
            "timestamp": "2024-03-02T10:00:00Z",
            "customer_id": "cus_beta",
            "subscription_id": "sub_beta",
            "plan_id": "plan_team",
            "amount_cents": 29_900
        }),
        json!({
            "event_id": "evt_005",
            "event_type": "payment_failed",
            "timestamp": "2024-03-03T10:00:00Z",
            "customer_id": "cus_beta"
        }),
        json!({
            "event_id": "evt_006",
            "event_type": "payment_failed",
            "timestamp": "2024-03-10T10:00:00Z",
            "customer_id": "cus_beta"
        }),
        json!({
            "event_id": "evt_007",
            "event_type": "subscription_created",
            "timestamp": "2024-03-05T12:00:00Z",
            "customer_id": "cus_gamma",
            "subscription_id": "sub_gamma",
            "amount_cents": 4900
        }),
        json!({
            "event_id": "evt_008",
            "event_type": "subscription_cancelled",
            "timestamp": "2024-03-20T12:00:00Z",
            "customer_id": "cus_gamma",
            "subscription_id": "sub_gamma"
        }),
    ]
}

fn signals() -> ChurnInputs {
    ChurnInputs {
        usage_metrics: vec![UsageMetric {
            customer_id: "cus_beta".to_string(),
            metric_name: "api_calls".to_string(),
            previous_value: 10_000.0,
            current_value: 2_000.0,
        }],
        support_tickets: vec![SupportTicket {
            customer_id: "cus_beta".to_string(),
            ticket_id: "tkt_1".to_string(),
            open: true,
            severity: TicketSeverity::High,
        }],
        plan_downgrades: Vec::new(),
        reference_date: None,
    }
}

#[test]
fn repeated_runs_are_bit_identical() {
    let a = pipeline::run(&config(), &batch(), &signals()).unwrap();
    let b = pipeline::run(&config(), &batch(), &signals()).unwrap();

    let a_json = serde_json::to_value(&a.bundle).unwrap();
    let b_json = serde_json::to_value(&b.bundle).unwrap();
    assert_eq!(a_json, b_json);

    let a_report = serde_json::to_value(&a.report).unwrap();
    let b_report = serde_json::to_value(&b.report).unwrap();
    assert_eq!(a_report, b_report);

    assert_eq!(a.trace_id, b.trace_id);
    assert_eq!(a.recon.report_hash, b.recon.report_hash);
}

#[test]
fn input_order_does_not_affect_output() {
    let forward = pipeline::run(&config(), &batch(), &signals()).unwrap();

    let mut reversed = batch();
    reversed.reverse();
    let backward = pipeline::run(&config(), &reversed, &signals()).unwrap();

    assert_eq!(forward.trace_id, backward.trace_id);
    assert_eq!(forward.recon.report_hash, backward.recon.report_hash);
    assert_eq!(
        forward.bundle.canonicalization.canonical_hash,
        backward.bundle.canonicalization.canonical_hash
    );
    assert_eq!(forward.ledger.total_mrr_cents, backward.ledger.total_mrr_cents);
}

#[test]
fn canceled_subscription_contributes_no_mrr() {
    let out = pipeline::run(&config(), &batch(), &signals()).unwrap();
    // alpha 9900 + beta 29900; gamma canceled in-window.
    assert_eq!(out.ledger.total_mrr_cents, 39_800);
    assert_eq!(out.ledger.active_subscriptions, 2);
    let gamma = &out.ledger.customers["cus_gamma"];
    assert!(gamma.subscriptions[0].status.is_canceled());
}

#[test]
fn beta_surfaces_in_every_analysis_stage() {
    let out = pipeline::run(&config(), &batch(), &signals()).unwrap();

    // Unpaid 29900 subscription: a missing-invoice discrepancy.
    assert!(
        out.recon
            .discrepancies
            .iter()
            .any(|d| d.customer_id == "cus_beta")
    );
    // Two failures and never paid: a missing-payment discrepancy too.
    assert!(!out.recon.is_balanced);

    // Failures, usage drop, open high-severity ticket, inactivity.
    let beta_risk = out
        .churn
        .iter()
        .find(|r| r.customer_id == "cus_beta")
        .expect("beta should be scored");
    assert!(beta_risk.signals.len() >= 3);
    assert!(beta_risk.risk_score > 0);
}

#[test]
fn anomaly_ids_are_stable_across_runs() {
    let mut records = batch();
    // Pay the same invoice twice to provoke a double charge.
    records.push(json!({
        "event_id": "evt_dup",
        "event_type": "invoice_paid",
        "timestamp": "2024-03-01T09:30:00Z",
        "customer_id": "cus_alpha",
        "invoice_id": "inv_alpha_1",
        "amount_cents": 9900
    }));
    let a = pipeline::run(&config(), &records, &signals()).unwrap();
    let b = pipeline::run(&config(), &records, &signals()).unwrap();

    assert!(!a.anomalies.is_empty());
    let a_ids: Vec<&str> = a.anomalies.iter().map(|x| x.anomaly_id.as_str()).collect();
    let b_ids: Vec<&str> = b.anomalies.iter().map(|x| x.anomaly_id.as_str()).collect();
    assert_eq!(a_ids, b_ids);
}

#[test]
fn assembled_bundle_passes_its_own_validator() {
    let out = pipeline::run(&config(), &batch(), &signals()).unwrap();
    let outcome = validate_bundle(&out.bundle);
    assert!(outcome.success, "{:?}", outcome.errors);

    for request in &out.bundle.requests {
        assert_eq!(request.idempotency_key.len(), 64);
        assert!(request.job_id.starts_with("job_"));
    }
}

#[test]
fn report_summary_names_the_reconciliation_window() {
    let cfg = config();
    let out = pipeline::run(&cfg, &batch(), &signals()).unwrap();
    assert_eq!(out.report.summary.period_start, cfg.period_start);
    assert_eq!(out.report.summary.period_end, cfg.period_end);

    // Consumers see the bounds on the serialized envelope.
    let envelope = serde_json::to_value(&out.report).unwrap();
    assert!(envelope["summary"].get("period_start").is_some());
    assert!(envelope["summary"].get("period_end").is_some());
}

#[test]
fn cost_snapshot_nets_refunds_against_payments() {
    let mut records = batch();
    records.push(json!({
        "event_id": "evt_refund",
        "event_type": "invoice_refunded",
        "timestamp": "2024-03-15T00:00:00Z",
        "customer_id": "cus_alpha",
        "invoice_id": "inv_alpha_1",
        "amount_cents": 1000
    }));
    let out = pipeline::run(&config(), &records, &signals()).unwrap();
    // Alpha's invoice carries no subscription_id, so it lands in usage.
    assert_eq!(out.costs.usage_cents, 9900);
    assert_eq!(out.costs.subscription_cents, 0);
    assert_eq!(out.costs.refund_cents, -1000);
    assert_eq!(out.costs.total_cents, 8900);
}

#[test]
fn out_of_window_events_are_invisible() {
    let mut records = batch();
    records.push(json!({
        "event_id": "evt_outside",
        "event_type": "subscription_created",
        "timestamp": "2024-05-01T00:00:00Z",
        "customer_id": "cus_late",
        "subscription_id": "sub_late",
        "amount_cents": 99_900
    }));
    let out = pipeline::run(&config(), &records, &signals()).unwrap();
    assert!(!out.ledger.customers.contains_key("cus_late"));
    assert_eq!(out.ledger.total_mrr_cents, 39_800);
}
