//! Rule-based anomaly detection over events and ledger state.
//!
//! Seven independent detectors run in a fixed order; each is pure and
//! order-independent relative to the others. Anomaly ids are content
//! hashes of (type, tenant, project, discriminating key), so re-detection
//! across runs is idempotent.
//!
//! Detection is best-effort per item: a constructed anomaly that fails its
//! own output check is dropped (with a warning) rather than aborting the
//! batch.

mod detectors;
mod types;


pub use detectors::detect;
pub use types::{Anomaly, AnomalyType, Severity};
