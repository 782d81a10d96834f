//! Tenant and project identifier grammar.
//!
//! Identifiers flow into content hashes and downstream job ids, so the
//! grammar is enforced wherever an identity enters the system: lowercase
//! ASCII alphanumerics plus hyphens for tenants, with underscores also
//! allowed for projects. Byte checks only; no regex.

use thiserror::Error;

/// Maximum identifier length in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Errors raised by identifier validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// The identifier is empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier exceeds [`MAX_IDENTIFIER_LEN`] bytes.
    #[error("identifier exceeds {MAX_IDENTIFIER_LEN} bytes: {len}")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
    },

    /// The identifier contains a byte outside its grammar.
    #[error("invalid character {found:?} at byte {position}")]
    InvalidCharacter {
        /// Offending character.
        found: char,
        /// Byte offset of the offending character.
        position: usize,
    },
}

/// Validates a tenant identifier: `[a-z0-9-]+`, at most 64 bytes.
///
/// # Errors
///
/// Returns an [`IdentityError`] describing the first violation.
pub fn validate_tenant_id(id: &str) -> Result<(), IdentityError> {
    validate(id, false)
}

/// Validates a project identifier: `[a-z0-9_-]+`, at most 64 bytes.
///
/// # Errors
///
/// Returns an [`IdentityError`] describing the first violation.
pub fn validate_project_id(id: &str) -> Result<(), IdentityError> {
    validate(id, true)
}

fn validate(id: &str, allow_underscore: bool) -> Result<(), IdentityError> {
    if id.is_empty() {
        return Err(IdentityError::Empty);
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentityError::TooLong { len: id.len() });
    }
    for (position, byte) in id.bytes().enumerate() {
        let ok = byte.is_ascii_lowercase()
            || byte.is_ascii_digit()
            || byte == b'-'
            || (allow_underscore && byte == b'_');
        if !ok {
            return Err(IdentityError::InvalidCharacter {
                found: char::from(byte),
                position,
            });
        }
    }
    Ok(())
}
