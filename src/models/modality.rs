use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registration category within an event (distance, ticket tier, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Modality {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Base price; a currently open batch overrides it.
    pub price: Decimal,
    /// None means unbounded.
    pub capacity: Option<i32>,
    pub sold_slots: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Modality {
    /// Whether at least one slot remains. `sold_slots <= capacity` is the
    /// stored invariant; equality means full.
    pub fn has_free_slot(&self) -> bool {
        match self.capacity {
            Some(cap) => self.sold_slots < cap,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn modality(capacity: Option<i32>, sold: i32) -> Modality {
        Modality {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "10k".to_string(),
            description: None,
            price: Decimal::new(5000, 2),
            capacity,
            sold_slots: sold,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unbounded_modality_always_has_slots() {
        assert!(modality(None, 1_000_000).has_free_slot());
    }

    #[test]
    fn full_modality_has_no_slots() {
        assert!(modality(Some(100), 99).has_free_slot());
        assert!(!modality(Some(100), 100).has_free_slot());
    }
}
