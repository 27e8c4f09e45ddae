//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock availability, lifecycle transitions). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// A reduction asked for more stock than the balance holds.
    #[error("insufficient inventory at {key}: requested {requested}, available {available}")]
    InsufficientInventory {
        key: String,
        requested: i64,
        available: i64,
    },

    /// The entity is not in a state that allows the requested transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness rule was violated (e.g. duplicate SKU).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The actor's role does not permit the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn insufficient(key: impl ToString, requested: i64, available: i64) -> Self {
        Self::InsufficientInventory {
            key: key.to_string(),
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Reject non-positive quantities.
pub fn ensure_positive(field: &str, quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(field, "must be a positive integer"));
    }
    Ok(())
}

/// Reject negative quantities (zero allowed).
pub fn ensure_non_negative(field: &str, quantity: i64) -> DomainResult<()> {
    if quantity < 0 {
        return Err(DomainError::validation(field, "must not be negative"));
    }
    Ok(())
}

/// Reject blank strings.
pub fn ensure_not_blank(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_the_field() {
        let err = DomainError::validation("quantity", "must be a positive integer");
        assert_eq!(
            err.to_string(),
            "validation failed on `quantity`: must be a positive integer"
        );
    }

    #[test]
    fn quantity_guards() {
        assert!(ensure_positive("quantity", 1).is_ok());
        assert!(ensure_positive("quantity", 0).is_err());
        assert!(ensure_non_negative("good", 0).is_ok());
        assert!(ensure_non_negative("good", -1).is_err());
        assert!(ensure_not_blank("sku", "  ").is_err());
    }
}
