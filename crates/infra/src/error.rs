//! Engine-level error taxonomy.
//!
//! Every ledger operation returns [`LedgerError`]. Domain failures and store
//! failures are folded into it so callers only branch on one enum.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Source balance too low for a reduction. Recoverable by the caller.
    #[error("insufficient inventory at {key}: requested {requested}, available {available}")]
    InsufficientInventory {
        key: String,
        requested: i64,
        available: i64,
    },

    #[error("{0} not found")]
    NotFound(String),

    /// Malformed input, with field-level detail.
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Uniqueness violation (duplicate SKU or location code).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Serialization failure or deadlock. Retried by the engine first.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    /// Transient failures the engine retries transparently.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, message } => LedgerError::Validation { field, message },
            DomainError::InsufficientInventory {
                key,
                requested,
                available,
            } => LedgerError::InsufficientInventory {
                key,
                requested,
                available,
            },
            DomainError::InvalidState(msg) => LedgerError::InvalidState(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::Unauthorized(msg) => LedgerError::Unauthorized(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation {
                field: "id".to_string(),
                message: msg,
            },
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::ConcurrencyConflict(msg),
            StoreError::Duplicate(msg) => LedgerError::Conflict(msg),
            StoreError::Timeout(msg) => LedgerError::Timeout(msg),
            StoreError::Backend(msg) => LedgerError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrency_conflicts_are_retryable() {
        assert!(LedgerError::from(StoreError::Conflict("40001".into())).is_retryable());
        assert!(!LedgerError::from(StoreError::Timeout("lock".into())).is_retryable());
        assert!(!LedgerError::from(StoreError::Duplicate("sku".into())).is_retryable());
        assert!(!LedgerError::from(DomainError::insufficient("k", 5, 3)).is_retryable());
    }

    #[test]
    fn domain_errors_keep_their_detail() {
        let err = LedgerError::from(DomainError::validation("quantity", "must be positive"));
        assert_eq!(
            err,
            LedgerError::Validation {
                field: "quantity".to_string(),
                message: "must be positive".to_string(),
            }
        );
        let err = LedgerError::from(DomainError::invalid_id("ProductId: bad"));
        assert!(matches!(err, LedgerError::Validation { ref field, .. } if field == "id"));
    }
}
