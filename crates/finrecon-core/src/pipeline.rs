//! End-to-end pipeline orchestration.
//!
//! `run` wires the stages together: normalize, build ledger, reconcile,
//! detect anomalies, score churn, then package a job bundle and a report
//! envelope. The only wall-clock read in the entire crate happens here,
//! and stable-output mode replaces it with a fixed sentinel so repeated
//! runs over the same input are bit-identical.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::info;

use crate::anomaly::{self, Anomaly};
use crate::canonical;
use crate::churn::{self, ChurnInputs, ChurnRisk};
use crate::error::CoreError;
use crate::events::{self, NormalizeOutput, NormalizerOptions, TenantContext};
use crate::forge::{
    self, JobRequestBundle, JobSpec, JobType, ReportEnvelope, validate_bundle,
};
use crate::identity;
use crate::ledger::{LedgerBuilder, LedgerError, LedgerState, Period};
use crate::profile;
use crate::recon::{self, CostBreakdown, ReconError, ReconReport};
use crate::STABLE_TIMESTAMP;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Window start (inclusive).
    pub period_start: DateTime<Utc>,
    /// Window end (inclusive).
    pub period_end: DateTime<Utc>,
    /// Threshold profile id; unknown ids fall back to base.
    pub profile_id: String,
    /// Skip per-record validation, keeping every typeable record.
    pub skip_validation: bool,
    /// Replace wall-clock reads with the stable sentinel.
    pub stable_output: bool,
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalizer output, including per-record errors.
    pub normalized: NormalizeOutput,
    /// Reconstructed ledger.
    pub ledger: LedgerState,
    /// Reconciliation report.
    pub recon: ReconReport,
    /// Net charge totals for the window.
    pub costs: CostBreakdown,
    /// Detected anomalies.
    pub anomalies: Vec<Anomaly>,
    /// Scored churn risks.
    pub churn: Vec<ChurnRisk>,
    /// Packaged job requests.
    pub bundle: JobRequestBundle,
    /// Packaged report envelope.
    pub report: ReportEnvelope,
    /// Content-derived trace id shared by the bundle and report.
    pub trace_id: String,
}

/// Runs the full pipeline over one batch of raw records.
///
/// # Errors
///
/// Returns [`CoreError::Validation`] for bad configuration and
/// [`CoreError::Schema`] if any stage's output fails its own shape check.
pub fn run(
    config: &PipelineConfig,
    raw_records: &[Value],
    churn_inputs: &ChurnInputs,
) -> Result<PipelineOutput, CoreError> {
    identity::validate_tenant_id(&config.tenant_id)
        .map_err(|e| CoreError::validation(format!("tenant_id: {e}")))?;
    identity::validate_project_id(&config.project_id)
        .map_err(|e| CoreError::validation(format!("project_id: {e}")))?;
    if config.period_start > config.period_end {
        return Err(CoreError::validation(format!(
            "period_start {} is after period_end {}",
            config.period_start, config.period_end
        )));
    }

    let now = batch_time(config.stable_output);
    let ctx = TenantContext::new(&config.tenant_id, &config.project_id);
    let thresholds = profile::lookup(&config.profile_id);

    let normalized = events::normalize(
        raw_records,
        &ctx,
        NormalizerOptions {
            skip_validation: config.skip_validation,
        },
        now,
    );
    info!(
        events = normalized.events.len(),
        rejected = normalized.errors.len(),
        "normalization complete"
    );

    let period = Period {
        start: config.period_start,
        end: config.period_end,
    };
    let ledger = LedgerBuilder::new(ctx, period)
        .build(&normalized.events, now)
        .map_err(ledger_error)?;

    let recon = recon::reconcile(&ledger, now).map_err(recon_error)?;
    let costs = recon::cost_breakdown(&normalized.events, &period);
    let anomalies = anomaly::detect(&normalized.events, &ledger, &thresholds.anomaly, now);
    let churn = churn::score(&ledger, churn_inputs, &thresholds.churn);

    let trace_id = trace_id(config, &normalized)?;
    let bundle = forge::build_bundle(
        job_specs(&recon, &anomalies, &churn),
        &config.tenant_id,
        &config.project_id,
        &trace_id,
        now,
    )
    .map_err(forge_error)?;
    let outcome = validate_bundle(&bundle);
    if !outcome.success {
        return Err(CoreError::schema(format!(
            "assembled bundle failed validation: {}",
            outcome.errors.join("; ")
        )));
    }
    let report = forge::build_report(&recon, &anomalies, &churn, &trace_id, now)
        .map_err(forge_error)?;

    info!(
        discrepancies = recon.discrepancy_count,
        anomalies = anomalies.len(),
        churn_risks = churn.len(),
        trace_id,
        "pipeline run complete"
    );
    Ok(PipelineOutput {
        normalized,
        ledger,
        recon,
        costs,
        anomalies,
        churn,
        bundle,
        report,
        trace_id,
    })
}

fn batch_time(stable_output: bool) -> DateTime<Utc> {
    if stable_output {
        // The sentinel is a compile-time constant and always parses.
        STABLE_TIMESTAMP
            .parse()
            .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
    } else {
        Utc::now()
    }
}

/// Content-derived trace id: the run identity plus every accepted event's
/// source hash. Identical input yields an identical trace id.
fn trace_id(
    config: &PipelineConfig,
    normalized: &NormalizeOutput,
) -> Result<String, CoreError> {
    let hashes: Vec<&str> = normalized
        .events
        .iter()
        .map(|e| e.source_hash.as_str())
        .collect();
    let short = canonical::short_hash(&json!({
        "tenant_id": config.tenant_id,
        "project_id": config.project_id,
        "period_start": config.period_start.to_rfc3339(),
        "period_end": config.period_end.to_rfc3339(),
        "source_hashes": hashes,
    }))
    .map_err(|e| CoreError::schema(format!("trace id hash failed: {e}")))?;
    Ok(format!("trace_{short}"))
}

fn job_specs(
    recon: &ReconReport,
    anomalies: &[Anomaly],
    churn: &[ChurnRisk],
) -> Vec<JobSpec> {
    let mut specs = vec![JobSpec {
        job_type: JobType::Reconcile,
        payload: json!({
            "report_hash": recon.report_hash,
            "discrepancy_count": recon.discrepancy_count,
            "total_difference_cents": recon.total_difference_cents,
            "is_balanced": recon.is_balanced,
        }),
        metadata: Default::default(),
    }];
    if !anomalies.is_empty() {
        let ids: Vec<&str> = anomalies.iter().map(|a| a.anomaly_id.as_str()).collect();
        specs.push(JobSpec {
            job_type: JobType::AnomalyScan,
            payload: json!({
                "anomaly_count": anomalies.len(),
                "anomaly_ids": ids,
            }),
            metadata: Default::default(),
        });
    }
    if !churn.is_empty() {
        let customers: Vec<_> = churn
            .iter()
            .map(|r| {
                json!({
                    "customer_id": r.customer_id,
                    "risk_score": r.risk_score,
                    "risk_level": r.risk_level,
                })
            })
            .collect();
        specs.push(JobSpec {
            job_type: JobType::ChurnRisk,
            payload: json!({ "customers": customers }),
            metadata: Default::default(),
        });
    }
    specs
}

fn ledger_error(error: LedgerError) -> CoreError {
    match error {
        LedgerError::InvalidPeriod { .. } => CoreError::validation(error.to_string()),
        _ => CoreError::schema(error.to_string()),
    }
}

fn recon_error(error: ReconError) -> CoreError {
    CoreError::schema(error.to_string())
}

fn forge_error(error: forge::ForgeError) -> CoreError {
    CoreError::schema(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            tenant_id: "acme".to_string(),
            project_id: "prod".to_string(),
            period_start: "2024-01-01T00:00:00Z".parse().unwrap(),
            period_end: "2024-01-31T23:59:59Z".parse().unwrap(),
            profile_id: "base".to_string(),
            skip_validation: false,
            stable_output: true,
        }
    }

    fn records() -> Vec<Value> {
        vec![
            json!({
                "event_id": "evt_1",
                "event_type": "subscription_created",
                "timestamp": "2024-01-01T00:00:00Z",
                "customer_id": "cus_1",
                "subscription_id": "sub_1",
                "amount_cents": 5000
            }),
            json!({
                "event_id": "evt_2",
                "event_type": "invoice_paid",
                "timestamp": "2024-01-05T00:00:00Z",
                "customer_id": "cus_1",
                "subscription_id": "sub_1",
                "invoice_id": "inv_1",
                "amount_cents": 5000
            }),
        ]
    }

    #[test]
    fn stable_runs_are_bit_identical() {
        let cfg = config();
        let inputs = ChurnInputs::default();
        let a = run(&cfg, &records(), &inputs).unwrap();
        let b = run(&cfg, &records(), &inputs).unwrap();
        assert_eq!(a.trace_id, b.trace_id);
        assert_eq!(a.recon.report_hash, b.recon.report_hash);
        assert_eq!(
            a.bundle.canonicalization.canonical_hash,
            b.bundle.canonicalization.canonical_hash
        );
        assert_eq!(
            a.report.canonicalization.canonical_hash,
            b.report.canonicalization.canonical_hash
        );
        assert_eq!(a.ledger.total_mrr_cents, b.ledger.total_mrr_cents);
    }

    #[test]
    fn trace_id_tracks_input_content() {
        let cfg = config();
        let inputs = ChurnInputs::default();
        let a = run(&cfg, &records(), &inputs).unwrap();
        let mut changed = records();
        changed[1]["amount_cents"] = json!(4000);
        let b = run(&cfg, &changed, &inputs).unwrap();
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn bad_tenant_id_is_a_validation_error() {
        let mut cfg = config();
        cfg.tenant_id = "Acme Corp".to_string();
        let err = run(&cfg, &records(), &ChurnInputs::default()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn inverted_period_is_a_validation_error() {
        let mut cfg = config();
        std::mem::swap(&mut cfg.period_start, &mut cfg.period_end);
        let err = run(&cfg, &records(), &ChurnInputs::default()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn balanced_batch_yields_single_reconcile_job() {
        let out = run(&config(), &records(), &ChurnInputs::default()).unwrap();
        assert!(out.recon.is_balanced);
        assert_eq!(out.costs.subscription_cents, 5000);
        assert_eq!(out.costs.total_cents, 5000);
        assert!(out.anomalies.is_empty());
        assert_eq!(out.bundle.requests.len(), 1);
        assert_eq!(out.bundle.requests[0].job_type, JobType::Reconcile);
        assert!(validate_bundle(&out.bundle).success);
    }

    #[test]
    fn anomalous_batch_adds_an_anomaly_scan_job() {
        let mut recs = records();
        // Same invoice paid twice, same amount: a double charge.
        recs.push(json!({
            "event_id": "evt_3",
            "event_type": "invoice_paid",
            "timestamp": "2024-01-05T01:00:00Z",
            "customer_id": "cus_1",
            "subscription_id": "sub_1",
            "invoice_id": "inv_1",
            "amount_cents": 5000
        }));
        let out = run(&config(), &recs, &ChurnInputs::default()).unwrap();
        assert!(!out.anomalies.is_empty());
        assert!(
            out.bundle
                .requests
                .iter()
                .any(|r| r.job_type == JobType::AnomalyScan)
        );
    }

    #[test]
    fn bundle_and_report_share_the_trace_id() {
        let out = run(&config(), &records(), &ChurnInputs::default()).unwrap();
        assert_eq!(out.bundle.trace_id, out.trace_id);
        assert_eq!(out.report.trace_id, out.trace_id);
        assert!(out.trace_id.starts_with("trace_"));
    }
}
