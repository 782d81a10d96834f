//! Billing event model, validation, and normalization.
//!
//! Raw exports arrive as untyped JSON records. The normalizer validates each
//! record against the [`BillingEvent`] shape, attaches tenant/project
//! context, computes a content hash over the billing-relevant key subset,
//! and emits a deterministically ordered sequence of [`NormalizedEvent`]s.
//!
//! Ordering is load-bearing: the ledger builder replays events
//! chronologically, and ties on timestamp break by `event_id` so replays
//! are identical across runs.

mod normalize;
mod types;
mod validate;

pub use normalize::{IndexedError, NormalizeOutput, NormalizerOptions, normalize};
pub use types::{BillingEvent, EventType, FieldError, NormalizedEvent, TenantContext};
pub use validate::{RecordError, validate_record};
