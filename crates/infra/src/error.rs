//! Error surface of the ledger services.
//!
//! Domain errors, store errors and lookup failures are folded into one
//! [`LedgerError`] so callers match on a single enum.

use thiserror::Error;

use stockbook_core::DomainError;

use crate::store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// The referenced stock level or sale does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record that must be unique already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The change would break a ledger rule (e.g. insufficient stock, illegal status move).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Optimistic concurrency kept failing after all retries.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// The store failed; nothing from the operation was persisted.
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Caller errors: retrying the same input cannot succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_)
                | LedgerError::Conflict(_)
                | LedgerError::Validation(_)
                | LedgerError::InvariantViolation(_)
        )
    }

    /// Errors where a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Concurrency(_) | LedgerError::Persistence(StoreError::Backend(_))
        )
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::NotFound(msg) => LedgerError::NotFound(msg),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::Concurrency(msg),
            StoreError::Duplicate(msg) => LedgerError::Conflict(msg),
            StoreError::MissingRow(msg) => LedgerError::NotFound(msg),
            other => LedgerError::Persistence(other),
        }
    }
}
