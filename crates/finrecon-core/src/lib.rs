//! finrecon-core - deterministic billing analysis pipeline.
//!
//! This crate ingests offline billing-event exports, reconstructs a
//! per-tenant financial ledger, reconciles expected against observed
//! recurring revenue, detects operational anomalies, scores customer churn
//! risk, and packages the results into hash-verifiable batch-job requests
//! for an external execution system.
//!
//! # Design Principles
//!
//! 1. **Determinism**: every stage produces bit-identical output for
//!    bit-identical input. Stable sort tie-breaks, `BTreeMap`-backed
//!    collections, and canonical JSON serialization are used throughout.
//! 2. **Idempotency**: all derived identifiers (anomaly ids, idempotency
//!    keys, report hashes) are content hashes, so re-running a batch
//!    produces the same ids and downstream systems can safely deduplicate.
//! 3. **Offline**: no network calls, no schedulers, no persistent storage.
//!    The only wall-clock read sits at the pipeline boundary and is replaced
//!    by a fixed sentinel under stable-output mode.
//!
//! # Pipeline
//!
//! ```text
//! raw events --> events::normalize --> ledger::build --> recon::reconcile
//!                      |                   |                  |
//!                      +------> anomaly::detect <---+         |
//!                                    |              |         |
//!              churn inputs --> churn::score <------+         |
//!                                    |                        |
//!                                    v                        v
//!                        forge::build_bundle / forge::build_report
//! ```
//!
//! All stages are wired together by [`pipeline::run`]; each is also usable
//! on its own.

pub mod anomaly;
pub mod canonical;
pub mod churn;
pub mod error;
pub mod events;
pub mod forge;
pub mod identity;
pub mod ledger;
pub mod pipeline;
pub mod profile;
pub mod recon;

pub use error::CoreError;
pub use pipeline::{PipelineConfig, PipelineOutput};

/// Sentinel timestamp substituted for wall-clock reads under stable-output
/// mode.
pub const STABLE_TIMESTAMP: &str = "2000-01-01T00:00:00Z";

/// Schema version stamped on every packaged bundle and report envelope.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Module identifier stamped on packaged output.
pub const MODULE_ID: &str = "finrecon";
