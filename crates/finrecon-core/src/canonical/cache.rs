//! Bounded content-hash cache.
//!
//! Replayed exports hash the same billing content repeatedly, which is
//! common enough to be worth memoizing. The cache is
//! keyed by the canonical string itself rather than object identity, so it
//! is a pure optimization: hits and misses produce identical results.
//! Eviction is straightforward insertion-order FIFO with a fixed capacity.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::json::{CanonicalError, canonical_string};

/// Default number of cached entries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A bounded cache from canonical JSON strings to their SHA-256 digests.
#[derive(Debug)]
pub struct HashCache {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for HashCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl HashCache {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A zero capacity disables caching entirely; every call recomputes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns the content hash of `value`, serving repeats from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::MaxDepthExceeded`] if the value is nested
    /// too deeply.
    pub fn hash(&mut self, value: &Value) -> Result<String, CanonicalError> {
        let canonical = canonical_string(value)?;
        if let Some(hash) = self.entries.get(&canonical) {
            return Ok(hash.clone());
        }
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        if self.capacity > 0 {
            if self.entries.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.entries.insert(canonical.clone(), hash.clone());
            self.order.push_back(canonical);
        }
        Ok(hash)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
