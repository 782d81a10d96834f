//! Event normalization: validate, attach context, hash, and order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::types::{BillingEvent, EventType, FieldError, NormalizedEvent, TenantContext};
use super::validate::{RecordError, validate_record};
use crate::canonical;

/// Normalizer behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizerOptions {
    /// Keep schema-violating (but typeable) events instead of dropping them.
    pub skip_validation: bool,
}

/// Validation failures for one raw input record, by input index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IndexedError {
    /// Index of the record in the raw input array.
    pub index: usize,
    /// Field-level failures for that record.
    pub errors: Vec<FieldError>,
}

/// Output of a normalization pass.
#[derive(Debug, Clone)]
pub struct NormalizeOutput {
    /// Normalized events, sorted by (timestamp, event_id) ascending.
    pub events: Vec<NormalizedEvent>,
    /// Per-index validation failures (dropped and kept-with-errors records).
    pub errors: Vec<IndexedError>,
    /// Count of normalized events by type.
    pub counts: BTreeMap<EventType, usize>,
}

/// Normalizes raw records into an ordered event sequence.
///
/// Each record is validated and projected into a [`BillingEvent`] with
/// tenant/project context attached. Records that fail validation are
/// dropped and surfaced in `errors`; with `skip_validation` set, typeable
/// records are kept with their `validation_errors` populated. Non-object
/// records are always dropped.
///
/// `normalized_at` is supplied by the caller so the core itself never reads
/// the wall clock.
///
/// The result is stably sorted by (timestamp ascending, event_id
/// ascending). The ledger builder requires chronological replay, and ties
/// must break identically across runs.
#[must_use]
pub fn normalize(
    raw_records: &[Value],
    ctx: &TenantContext,
    options: NormalizerOptions,
    normalized_at: DateTime<Utc>,
) -> NormalizeOutput {
    let mut events = Vec::with_capacity(raw_records.len());
    let mut errors = Vec::new();
    // Replayed exports repeat records verbatim; identical billing content
    // hits the cache instead of rehashing.
    let mut hashes = canonical::HashCache::default();

    for (index, raw) in raw_records.iter().enumerate() {
        match validate_record(raw, ctx) {
            Ok(event) => {
                events.push(into_normalized(event, normalized_at, Vec::new(), &mut hashes));
            },
            Err(RecordError::Unprocessable { errors: field_errors }) => {
                debug!(index, "dropping unprocessable record");
                errors.push(IndexedError {
                    index,
                    errors: field_errors,
                });
            },
            Err(RecordError::Schema {
                errors: field_errors,
                lenient,
            }) => {
                if options.skip_validation {
                    events.push(into_normalized(
                        *lenient,
                        normalized_at,
                        field_errors.clone(),
                        &mut hashes,
                    ));
                } else {
                    debug!(index, "dropping record with schema violations");
                }
                errors.push(IndexedError {
                    index,
                    errors: field_errors,
                });
            },
        }
    }

    // Stable sort: equal (timestamp, event_id) pairs keep input order.
    events.sort_by(|a, b| {
        a.event
            .timestamp
            .cmp(&b.event.timestamp)
            .then_with(|| a.event.event_id.cmp(&b.event.event_id))
    });

    let mut counts: BTreeMap<EventType, usize> = BTreeMap::new();
    for event in &events {
        *counts.entry(event.event.event_type).or_insert(0) += 1;
    }

    debug!(
        kept = events.len(),
        rejected = raw_records.len() - events.len(),
        "normalization pass complete"
    );

    NormalizeOutput {
        events,
        errors,
        counts,
    }
}

fn into_normalized(
    event: BillingEvent,
    normalized_at: DateTime<Utc>,
    validation_errors: Vec<FieldError>,
    hashes: &mut canonical::HashCache,
) -> NormalizedEvent {
    let source_hash = source_hash(&event, hashes);
    NormalizedEvent {
        event,
        normalized_at,
        source_hash,
        validation_errors,
    }
}

/// Computes the content hash over the fixed billing-content key subset.
///
/// The subset deliberately excludes volatile fields (`normalized_at`,
/// `metadata`, `raw_payload`) so the hash reflects only billing content.
fn source_hash(event: &BillingEvent, hashes: &mut canonical::HashCache) -> String {
    let subset = json!({
        "tenant_id": event.tenant_id,
        "project_id": event.project_id,
        "event_id": event.event_id,
        "event_type": event.event_type,
        "timestamp": event.timestamp.to_rfc3339(),
        "customer_id": event.customer_id,
        "subscription_id": event.subscription_id,
        "invoice_id": event.invoice_id,
        "amount_cents": event.amount_cents,
        "currency": event.currency,
        "plan_id": event.plan_id,
    });
    match hashes.hash(&subset) {
        Ok(hash) => hash,
        Err(error) => {
            // The subset is a flat object of scalars; depth failure here
            // would be a programming bug.
            warn!(%error, "source hash fell back to empty digest");
            String::new()
        },
    }
}
