use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, LocationId, ensure_not_blank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    /// Warehouse shelf.
    Warehouse,
    Store,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Store => "store",
        }
    }
}

impl core::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouse" => Ok(LocationKind::Warehouse),
            "store" => Ok(LocationKind::Store),
            other => Err(DomainError::validation(
                "kind",
                format!("unknown location kind '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocation {
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
    pub display_order: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Location {
    pub fn create(id: LocationId, input: NewLocation, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_not_blank("code", &input.code)?;
        ensure_not_blank("name", &input.name)?;
        Ok(Self {
            id,
            code: input.code.trim().to_string(),
            name: input.name.trim().to_string(),
            kind: input.kind,
            display_order: input.display_order,
            active: true,
            created_at: at,
        })
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == LocationKind::Warehouse
    }

    pub fn is_store(&self) -> bool {
        self.kind == LocationKind::Store
    }

    pub fn deactivate(&mut self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invalid_state(format!(
                "location {} is already inactive",
                self.code
            )));
        }
        self.active = false;
        Ok(())
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::invalid_state(format!(
                "location {} is inactive",
                self.code
            )));
        }
        Ok(())
    }

    /// Active and of the expected kind; `field` names the argument in errors.
    pub fn ensure_kind(&self, kind: LocationKind, field: &str) -> DomainResult<()> {
        self.ensure_active()?;
        if self.kind != kind {
            return Err(DomainError::validation(
                field,
                format!("location {} is a {}, expected a {}", self.code, self.kind, kind),
            ));
        }
        Ok(())
    }
}

/// First active warehouse by display order, then code.
pub fn primary_warehouse(locations: &[Location]) -> Option<&Location> {
    locations
        .iter()
        .filter(|l| l.active && l.is_warehouse())
        .min_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.code.cmp(&b.code))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(code: &str, kind: LocationKind, display_order: i32) -> Location {
        Location::create(
            LocationId::new(),
            NewLocation {
                code: code.to_string(),
                name: format!("{code} name"),
                kind,
                display_order,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn primary_warehouse_prefers_display_order_then_code() {
        let mut b = location("WH-B", LocationKind::Warehouse, 1);
        let a = location("WH-A", LocationKind::Warehouse, 1);
        let first = location("WH-Z", LocationKind::Warehouse, 0);
        let store = location("ST-1", LocationKind::Store, -5);

        let mut all = vec![b.clone(), a.clone(), store.clone()];
        assert_eq!(primary_warehouse(&all).unwrap().code, "WH-A");

        all.push(first.clone());
        assert_eq!(primary_warehouse(&all).unwrap().code, "WH-Z");

        b.deactivate().unwrap();
        let only_inactive = vec![b, store];
        assert!(primary_warehouse(&only_inactive).is_none());
    }

    #[test]
    fn ensure_kind_rejects_wrong_kind_and_inactive() {
        let mut store = location("ST-1", LocationKind::Store, 0);
        let err = store
            .ensure_kind(LocationKind::Warehouse, "source_location_id")
            .unwrap_err();
        assert!(
            matches!(err, DomainError::Validation { ref field, .. } if field == "source_location_id")
        );

        store.deactivate().unwrap();
        assert!(matches!(
            store.ensure_kind(LocationKind::Store, "destination_location_id"),
            Err(DomainError::InvalidState(_))
        ));
        assert!(store.deactivate().is_err());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&LocationKind::Warehouse).unwrap();
        assert_eq!(json, "\"warehouse\"");
        assert_eq!("store".parse::<LocationKind>().unwrap(), LocationKind::Store);
    }
}
