//! Top-level error taxonomy for the pipeline.
//!
//! Four categories cover every failure the core can surface:
//!
//! - [`CoreError::Validation`]: malformed or non-conforming input.
//!   Non-retryable; the caller must fix the input.
//! - [`CoreError::Schema`]: an internally constructed value violated its own
//!   output shape. This indicates a programming bug, not bad input, and is
//!   treated as fatal.
//! - [`CoreError::Io`] / [`CoreError::Upstream`]: boundary-only failures.
//!   The core itself never raises these; they exist so callers at the I/O
//!   boundary can flow through the same taxonomy.
//!
//! Per-event validation failures do not become a `CoreError` at all: they
//! accumulate in the normalizer output alongside partial success.

use thiserror::Error;

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Input failed validation. Non-retryable.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// An internally constructed output violated its own shape. Fatal.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the broken invariant.
        message: String,
    },

    /// Boundary I/O failure. Never raised by the core itself.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failure.
        message: String,
        /// Whether the caller may retry.
        retryable: bool,
    },

    /// Upstream collaborator failure. Never raised by the core itself.
    #[error("upstream error: {message}")]
    Upstream {
        /// Description of the failure.
        message: String,
        /// Whether the caller may retry.
        retryable: bool,
    },
}

impl CoreError {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
        }
    }

    /// Whether the failure may succeed on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::Schema { .. } => false,
            Self::Io { retryable, .. } | Self::Upstream { retryable, .. } => *retryable,
        }
    }

    /// Convenience constructor for validation failures.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Convenience constructor for schema (internal invariant) failures.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }
}
