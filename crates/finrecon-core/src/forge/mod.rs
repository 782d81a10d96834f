//! Packaging of analysis output into hash-stamped job requests and report
//! envelopes.
//!
//! Every request carries an idempotency key hashed from (job type, tenant,
//! project, payload), so an external executor can detect and safely replay
//! duplicate submissions. Bundles and report envelopes carry a
//! canonicalization block whose hash is computed over the entire value
//! minus the block itself.
//!
//! Bundle validation is an explicit, non-throwing pass returning
//! `{success, errors}` so callers decide whether to proceed. The policy
//! gate inside it rejects any request whose payload names an action without
//! `metadata.requires_policy_token` set, preventing side-effecting requests
//! from slipping through as dry-run analysis output.

mod bundle;
mod report;

pub use bundle::{
    CanonicalizationBlock, ForgeError, JobRequest, JobRequestBundle, JobSpec, JobType,
    ValidationOutcome, build_bundle, validate_bundle,
};
pub use report::{Finding, ReportEnvelope, ReportSummary, build_report};
