//! Job request assembly and bundle validation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::canonical;
use crate::identity;
use crate::{MODULE_ID, SCHEMA_VERSION};

/// Default request priority.
const DEFAULT_PRIORITY: u8 = 5;
/// Default retry budget for the downstream executor.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default request timeout handed to the downstream executor.
const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Payload keys that indicate a side-effecting request.
const ACTION_KEYS: [&str; 3] = ["action", "action_type", "action_name"];

/// Batch job categories emitted by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AnomalyScan,
    ChurnRisk,
    Reconcile,
}

impl JobType {
    /// Snake-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AnomalyScan => "anomaly_scan",
            Self::ChurnRisk => "churn_risk",
            Self::Reconcile => "reconcile",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalization stamp carried by bundles and report envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalizationBlock {
    /// Hash algorithm identifier.
    pub algorithm: String,
    /// Canonical serialization format identifier.
    pub canonical_format: String,
    /// Hash over the carrying value minus this block.
    pub canonical_hash: String,
}

impl CanonicalizationBlock {
    fn stamped(canonical_hash: String) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            canonical_format: "json-stable".to_string(),
            canonical_hash,
        }
    }
}

/// A single batch-job request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job category.
    pub job_type: JobType,
    /// Deterministic job id derived from the idempotency key.
    pub job_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// When the request was assembled (stable sentinel under stable
    /// output).
    pub requested_at: DateTime<Utc>,
    /// Job payload.
    pub payload: Value,
    /// Execution priority (lower runs earlier).
    pub priority: u8,
    /// Retry budget.
    pub max_retries: u32,
    /// Execution timeout.
    pub timeout_seconds: u64,
    /// Request metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Content hash of (job_type, tenant, project, payload).
    pub idempotency_key: String,
}

/// Raw job input before assembly.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job category.
    pub job_type: JobType,
    /// Job payload.
    pub payload: Value,
    /// Request metadata.
    pub metadata: BTreeMap<String, Value>,
}

/// Assembled, hash-stamped bundle of job requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequestBundle {
    /// Envelope schema version.
    pub schema_version: String,
    /// Producing module identifier.
    pub module_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Project scope.
    pub project_id: String,
    /// Trace id tying the bundle to its pipeline run.
    pub trace_id: String,
    /// Requests, sorted by job type.
    pub requests: Vec<JobRequest>,
    /// Canonicalization stamp.
    pub canonicalization: CanonicalizationBlock,
    /// Bundle metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Result of an explicit bundle validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the bundle passed all checks.
    pub success: bool,
    /// Violations found, empty on success.
    pub errors: Vec<String>,
}

/// Errors raised during packaging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// Canonicalization failed.
    #[error(transparent)]
    Canonical(#[from] canonical::CanonicalError),

    /// A value could not be serialized for hashing.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },
}

/// Computes the idempotency key for a request identity.
///
/// # Errors
///
/// Returns an error if the payload cannot be canonicalized.
pub fn idempotency_key(
    job_type: JobType,
    tenant_id: &str,
    project_id: &str,
    payload: &Value,
) -> Result<String, ForgeError> {
    Ok(canonical::content_hash(&json!({
        "job_type": job_type.as_str(),
        "tenant_id": tenant_id,
        "project_id": project_id,
        "payload": payload,
    }))?)
}

/// Assembles job specs into a validated, hash-stamped bundle.
///
/// Requests are sorted by job type (ties by job id) so bundle layout is
/// deterministic regardless of spec order.
///
/// # Errors
///
/// Returns an error if canonicalization or serialization fails.
pub fn build_bundle(
    specs: Vec<JobSpec>,
    tenant_id: &str,
    project_id: &str,
    trace_id: &str,
    requested_at: DateTime<Utc>,
) -> Result<JobRequestBundle, ForgeError> {
    let mut requests = Vec::with_capacity(specs.len());
    for spec in specs {
        let key = idempotency_key(spec.job_type, tenant_id, project_id, &spec.payload)?;
        let job_id = format!("job_{}", &key[..16]);
        requests.push(JobRequest {
            job_type: spec.job_type,
            job_id,
            tenant_id: tenant_id.to_string(),
            project_id: project_id.to_string(),
            requested_at,
            payload: spec.payload,
            priority: DEFAULT_PRIORITY,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            metadata: spec.metadata,
            idempotency_key: key,
        });
    }
    requests.sort_by(|a, b| a.job_type.cmp(&b.job_type).then_with(|| a.job_id.cmp(&b.job_id)));

    let mut bundle = JobRequestBundle {
        schema_version: SCHEMA_VERSION.to_string(),
        module_id: MODULE_ID.to_string(),
        tenant_id: tenant_id.to_string(),
        project_id: project_id.to_string(),
        trace_id: trace_id.to_string(),
        requests,
        canonicalization: CanonicalizationBlock::stamped(String::new()),
        metadata: BTreeMap::new(),
    };
    bundle.canonicalization = CanonicalizationBlock::stamped(hash_without_stamp(&bundle)?);
    debug!(requests = bundle.requests.len(), "job bundle assembled");
    Ok(bundle)
}

/// Hashes a serializable value with its `canonicalization` key removed.
pub(crate) fn hash_without_stamp<T: Serialize>(value: &T) -> Result<String, ForgeError> {
    let mut as_value = serde_json::to_value(value).map_err(|e| ForgeError::Serialize {
        message: e.to_string(),
    })?;
    if let Some(obj) = as_value.as_object_mut() {
        obj.remove("canonicalization");
    }
    Ok(canonical::content_hash(&as_value)?)
}

/// Validates a bundle without throwing.
///
/// Checks schema version, identifier grammar, request scoping, idempotency
/// key integrity, the canonicalization stamp, and the policy-token gate.
#[must_use]
pub fn validate_bundle(bundle: &JobRequestBundle) -> ValidationOutcome {
    let mut errors = Vec::new();

    if bundle.schema_version != SCHEMA_VERSION {
        errors.push(format!(
            "unsupported schema_version: {}",
            bundle.schema_version
        ));
    }
    if let Err(error) = identity::validate_tenant_id(&bundle.tenant_id) {
        errors.push(format!("tenant_id: {error}"));
    }
    if let Err(error) = identity::validate_project_id(&bundle.project_id) {
        errors.push(format!("project_id: {error}"));
    }

    for (i, pair) in bundle.requests.windows(2).enumerate() {
        if pair[0].job_type > pair[1].job_type {
            errors.push(format!("requests out of job_type order at index {}", i + 1));
        }
    }

    for request in &bundle.requests {
        if request.tenant_id != bundle.tenant_id || request.project_id != bundle.project_id {
            errors.push(format!(
                "request {} is scoped outside the bundle tenant/project",
                request.job_id
            ));
        }
        match idempotency_key(
            request.job_type,
            &request.tenant_id,
            &request.project_id,
            &request.payload,
        ) {
            Ok(expected) if expected == request.idempotency_key => {},
            Ok(expected) => errors.push(format!(
                "request {} idempotency_key mismatch: expected {expected}",
                request.job_id
            )),
            Err(error) => errors.push(format!(
                "request {} payload cannot be hashed: {error}",
                request.job_id
            )),
        }
        if payload_names_action(&request.payload) && !has_policy_token(request) {
            errors.push(format!(
                "request {} names an action but lacks metadata.requires_policy_token",
                request.job_id
            ));
        }
    }

    match hash_without_stamp(bundle) {
        Ok(expected) => {
            if bundle.canonicalization.algorithm != "sha256"
                || bundle.canonicalization.canonical_format != "json-stable"
            {
                errors.push("unsupported canonicalization block".to_string());
            } else if bundle.canonicalization.canonical_hash != expected {
                errors.push(format!(
                    "canonical_hash mismatch: expected {expected}"
                ));
            }
        },
        Err(error) => errors.push(format!("bundle cannot be hashed: {error}")),
    }

    ValidationOutcome {
        success: errors.is_empty(),
        errors,
    }
}

/// Whether a payload contains an action-designating key at any depth.
fn payload_names_action(payload: &Value) -> bool {
    match payload {
        Value::Object(obj) => {
            obj.keys().any(|k| ACTION_KEYS.contains(&k.as_str()))
                || obj.values().any(payload_names_action)
        },
        Value::Array(items) => items.iter().any(payload_names_action),
        _ => false,
    }
}

fn has_policy_token(request: &JobRequest) -> bool {
    request
        .metadata
        .get("requires_policy_token")
        .is_some_and(|v| v == &Value::Bool(true))
}
