//! Canonical JSON serialization and content hashing.
//!
//! Every content hash in the pipeline (source hashes, anomaly ids,
//! idempotency keys, report hashes, bundle stamps) is computed over the
//! canonical form produced here, so two structurally equal values always
//! hash identically regardless of original key insertion order.
//!
//! # Canonicalization Rules
//!
//! 1. Object keys are sorted lexicographically (byte order)
//! 2. Arrays preserve element order
//! 3. Scalars and `null` pass through unchanged
//! 4. Compact form has no whitespace between tokens
//!
//! Unlike stricter canonical-JSON profiles, fractional numbers are permitted
//! because churn confidences and signal weights are fractional. serde_json
//! emits the shortest round-trip representation for a given float bit
//! pattern, which is deterministic. Monetary amounts stay integral (cents)
//! and never rely on float formatting.
//!
//! # Example
//!
//! ```
//! use finrecon_core::canonical::{canonical_string, content_hash};
//! use serde_json::json;
//!
//! let a = json!({"z": 1, "a": 2});
//! let b = json!({"a": 2, "z": 1});
//! assert_eq!(canonical_string(&a).unwrap(), r#"{"a":2,"z":1}"#);
//! assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
//! ```

mod cache;
mod json;

pub use cache::HashCache;
pub use json::{
    CanonicalError, MAX_DEPTH, canonical_string, canonicalize, content_hash, serialize,
    short_hash,
};
