//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A screen name was blank after trimming.
    #[error("screen name is empty")]
    EmptyName,

    /// A screen name exceeded the length limit.
    #[error("screen name too long: {len} bytes (max: {max})")]
    NameTooLong { len: usize, max: usize },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
