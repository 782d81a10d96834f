//! Report envelope assembly.
//!
//! Reconciliation discrepancies, detected anomalies, and high-risk churn
//! scores are flattened into a single findings list with deterministic,
//! content-derived ids. The envelope carries the same canonicalization
//! stamp as job bundles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::bundle::{CanonicalizationBlock, ForgeError, hash_without_stamp};
use crate::anomaly::{Anomaly, Severity};
use crate::canonical;
use crate::churn::{ChurnRisk, RiskLevel};
use crate::recon::{DiscrepancyReason, ReconReport};
use crate::{MODULE_ID, SCHEMA_VERSION};

/// One flattened finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Deterministic id: `fnd_` plus a short content hash.
    pub finding_id: String,
    /// Short title.
    pub title: String,
    /// Human-readable description.
    pub description: String,
    /// Severity carried over from the source record.
    pub severity: Severity,
    /// Source category: `reconciliation`, `anomaly`, or `churn`.
    pub category: String,
    /// Identifiers backing the finding (event ids, subscription ids,
    /// customer ids).
    pub evidence: Vec<String>,
    /// Source-specific details.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Window identity plus counts over the findings list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Reconciliation window start, carried from the source report.
    pub period_start: DateTime<Utc>,
    /// Reconciliation window end.
    pub period_end: DateTime<Utc>,
    /// Total findings.
    pub total_findings: usize,
    /// Findings at critical severity.
    pub critical_count: usize,
    /// Findings at high severity.
    pub high_count: usize,
    /// Findings sourced from reconciliation.
    pub reconciliation_count: usize,
    /// Findings sourced from anomaly detection.
    pub anomaly_count: usize,
    /// Findings sourced from churn scoring.
    pub churn_count: usize,
}

/// Hash-stamped report envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    /// Envelope schema version.
    pub schema_version: String,
    /// Producing module identifier.
    pub module_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Trace id tying the report to its pipeline run.
    pub trace_id: String,
    /// Deterministic report id derived from the finding set.
    pub report_id: String,
    /// When the report was assembled (stable sentinel under stable
    /// output).
    pub generated_at: DateTime<Utc>,
    /// Report category.
    pub report_type: String,
    /// Window identity and counts over the findings.
    pub summary: ReportSummary,
    /// Flattened findings.
    pub findings: Vec<Finding>,
    /// Deduplicated recommendations derived from finding categories.
    pub recommendations: Vec<String>,
    /// Canonicalization stamp.
    pub canonicalization: CanonicalizationBlock,
    /// Envelope metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Assembles the report envelope from the analysis outputs.
///
/// Only churn risks at high or critical level become findings; the full
/// churn output travels in the job bundle instead. Findings keep source
/// order: reconciliation, then anomalies, then churn.
///
/// # Errors
///
/// Returns an error if canonicalization or serialization fails.
pub fn build_report(
    recon: &ReconReport,
    anomalies: &[Anomaly],
    churn: &[ChurnRisk],
    trace_id: &str,
    generated_at: DateTime<Utc>,
) -> Result<ReportEnvelope, ForgeError> {
    let mut findings = Vec::new();
    let mut summary = ReportSummary {
        period_start: recon.period_start,
        period_end: recon.period_end,
        total_findings: 0,
        critical_count: 0,
        high_count: 0,
        reconciliation_count: 0,
        anomaly_count: 0,
        churn_count: 0,
    };

    for discrepancy in &recon.discrepancies {
        let severity = match discrepancy.reason {
            DiscrepancyReason::DoubleCharge => Severity::High,
            DiscrepancyReason::MissingInvoice | DiscrepancyReason::MissingPayment => {
                Severity::Medium
            },
        };
        let mut evidence = vec![discrepancy.customer_id.clone()];
        if let Some(subscription_id) = &discrepancy.subscription_id {
            evidence.push(subscription_id.clone());
        }
        findings.push(make_finding(
            "reconciliation",
            severity,
            format!("MRR discrepancy: {:?}", discrepancy.reason),
            format!(
                "expected {} cents, observed {} cents for customer {}",
                discrepancy.expected_mrr_cents,
                discrepancy.observed_mrr_cents,
                discrepancy.customer_id
            ),
            evidence,
            BTreeMap::from([
                (
                    "difference_cents".to_string(),
                    json!(discrepancy.difference_cents),
                ),
                ("reason".to_string(), json!(discrepancy.reason)),
            ]),
        )?);
        summary.reconciliation_count += 1;
    }

    for anomaly in anomalies {
        findings.push(make_finding(
            "anomaly",
            anomaly.severity,
            format!("Anomaly: {}", anomaly.anomaly_type),
            anomaly.description.clone(),
            anomaly.affected_events.clone(),
            BTreeMap::from([
                ("anomaly_id".to_string(), json!(anomaly.anomaly_id)),
                ("confidence".to_string(), json!(anomaly.confidence)),
            ]),
        )?);
        summary.anomaly_count += 1;
    }

    for risk in churn {
        if risk.risk_level < RiskLevel::High {
            continue;
        }
        let severity = if risk.risk_level == RiskLevel::Critical {
            Severity::Critical
        } else {
            Severity::High
        };
        findings.push(make_finding(
            "churn",
            severity,
            format!("Churn risk: {}", risk.customer_id),
            risk.explanation.clone(),
            vec![risk.customer_id.clone()],
            BTreeMap::from([
                ("risk_score".to_string(), json!(risk.risk_score)),
                ("risk_level".to_string(), json!(risk.risk_level)),
            ]),
        )?);
        summary.churn_count += 1;
    }

    summary.total_findings = findings.len();
    summary.critical_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();
    summary.high_count = findings
        .iter()
        .filter(|f| f.severity == Severity::High)
        .count();

    let recommendations = recommend(&findings);
    let report_id = report_id(&recon.tenant_id, &recon.project_id, &findings)?;

    let mut envelope = ReportEnvelope {
        schema_version: SCHEMA_VERSION.to_string(),
        module_id: MODULE_ID.to_string(),
        tenant_id: recon.tenant_id.clone(),
        project_id: recon.project_id.clone(),
        trace_id: trace_id.to_string(),
        report_id,
        generated_at,
        report_type: "finops".to_string(),
        summary,
        findings,
        recommendations,
        canonicalization: CanonicalizationBlock {
            algorithm: "sha256".to_string(),
            canonical_format: "json-stable".to_string(),
            canonical_hash: String::new(),
        },
        metadata: BTreeMap::new(),
    };
    envelope.canonicalization.canonical_hash = hash_without_stamp(&envelope)?;

    debug!(
        findings = envelope.summary.total_findings,
        critical = envelope.summary.critical_count,
        "report envelope assembled"
    );
    Ok(envelope)
}

fn make_finding(
    category: &str,
    severity: Severity,
    title: String,
    description: String,
    evidence: Vec<String>,
    metadata: BTreeMap<String, Value>,
) -> Result<Finding, ForgeError> {
    let short = canonical::short_hash(&json!({
        "category": category,
        "title": &title,
        "evidence": &evidence,
    }))?;
    Ok(Finding {
        finding_id: format!("fnd_{short}"),
        title,
        description,
        severity,
        category: category.to_string(),
        evidence,
        metadata,
    })
}

fn report_id(
    tenant_id: &str,
    project_id: &str,
    findings: &[Finding],
) -> Result<String, ForgeError> {
    let ids: Vec<&str> = findings.iter().map(|f| f.finding_id.as_str()).collect();
    let short = canonical::short_hash(&json!({
        "tenant_id": tenant_id,
        "project_id": project_id,
        "findings": ids,
    }))?;
    Ok(format!("rpt_{short}"))
}

fn recommend(findings: &[Finding]) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |text: &str| {
        if !out.iter().any(|r| r == text) {
            out.push(text.to_string());
        }
    };
    for finding in findings {
        match finding.category.as_str() {
            "reconciliation" => {
                push("Review billing records for the flagged subscriptions");
            },
            "anomaly" => push("Investigate flagged events before the next billing cycle"),
            "churn" => push("Engage the retention team for high-risk customers"),
            _ => {},
        }
    }
    if findings.iter().any(|f| f.severity == Severity::Critical) {
        push("Escalate critical findings to the finance operations lead");
    }
    out
}
