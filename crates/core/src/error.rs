//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (policy rules,
/// invariants, state conflicts). Storage failures belong to the persistence
/// boundary and are wrapped separately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Split inputs are inconsistent with the chosen split policy.
    #[error("split policy violation: {0}")]
    PolicyViolation(String),

    /// Computed state failed to reconcile (e.g. splits vs. expense total).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced expense, split or participant does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The actor may not perform the operation.
    #[error("unauthorized")]
    Unauthorized,

    /// The split has already been settled.
    #[error("expense already settled for this participant")]
    AlreadySettled,

    /// A uniqueness or state conflict (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
