//! Explicit actor identity threaded through every ledger call.
//!
//! The session layer authenticates a user and hands the core an identifier and
//! a role. Nothing in the core reads "the current user" from ambient state.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Coarse role used for operation-level authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Store staff: sells, accepts customer returns, requests shipments.
    Store,
    /// Warehouse staff: confirms shipments, receives goods, inspects returns.
    Warehouse,
    /// Back office / batch jobs. Passes every role check.
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Store => "store",
            ActorRole::Warehouse => "warehouse",
            ActorRole::Admin => "admin",
        }
    }
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated actor performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    id: String,
    role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn store(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Store)
    }

    pub fn warehouse(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Warehouse)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    /// Every audited operation needs a non-blank actor identifier.
    pub fn ensure_identified(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::validation("actor", "actor id cannot be empty"));
        }
        Ok(())
    }

    /// Require one of `allowed` (admins always pass).
    pub fn ensure_role(&self, allowed: &[ActorRole], action: &str) -> DomainResult<()> {
        self.ensure_identified()?;
        if self.role == ActorRole::Admin || allowed.contains(&self.role) {
            return Ok(());
        }
        Err(DomainError::unauthorized(format!(
            "{} actor '{}' may not {}",
            self.role, self.id, action
        )))
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_passes_every_role_check() {
        let admin = Actor::admin("ops");
        assert!(admin.ensure_role(&[ActorRole::Warehouse], "confirm").is_ok());
        assert!(admin.ensure_role(&[], "run batch").is_ok());
    }

    #[test]
    fn store_actor_cannot_confirm() {
        let err = Actor::store("s-1")
            .ensure_role(&[ActorRole::Warehouse], "confirm shipping instructions")
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn blank_actor_is_a_validation_error() {
        let err = Actor::warehouse("  ")
            .ensure_role(&[ActorRole::Warehouse], "receive goods")
            .unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "actor"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
