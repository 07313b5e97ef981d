use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A pricing batch ("lot"): overrides the modality base price inside a date
/// window, optionally capped by a sales count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Batch {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub starts_at: DateTime<Utc>,
    /// None means the window stays open until superseded.
    pub ends_at: Option<DateTime<Utc>>,
    /// Sales cap; None means uncapped.
    pub sales_limit: Option<i32>,
    pub sales_count: i32,
    /// Organizer-set tie-break when two batches share an end date.
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// A batch applies when `now` is inside its window and its cap has not
    /// been reached.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if now < self.starts_at {
            return false;
        }
        if let Some(ends_at) = self.ends_at {
            if now >= ends_at {
                return false;
            }
        }
        match self.sales_limit {
            Some(limit) => self.sales_count < limit,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(starts: i64, ends: Option<i64>, limit: Option<i32>, sold: i32) -> Batch {
        let now = Utc::now();
        Batch {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "early bird".to_string(),
            price: Decimal::new(4000, 2),
            starts_at: now + Duration::hours(starts),
            ends_at: ends.map(|h| now + Duration::hours(h)),
            sales_limit: limit,
            sales_count: sold,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_inside_window() {
        assert!(batch(-1, Some(1), None, 0).is_open(Utc::now()));
    }

    #[test]
    fn closed_before_start_and_after_end() {
        assert!(!batch(1, Some(2), None, 0).is_open(Utc::now()));
        assert!(!batch(-2, Some(-1), None, 0).is_open(Utc::now()));
    }

    #[test]
    fn closed_when_cap_reached() {
        assert!(batch(-1, None, Some(100), 99).is_open(Utc::now()));
        assert!(!batch(-1, None, Some(100), 100).is_open(Utc::now()));
    }
}
