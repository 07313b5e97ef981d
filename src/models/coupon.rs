use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "discount_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a percentage in 0..=100.
    Percentage,
    /// `value` is an absolute amount in the event currency.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Stored uppercase; lookups normalize before matching.
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    /// None means unlimited.
    pub max_uses: Option<i32>,
    pub usage_count: i32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        if now < self.starts_at {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn has_remaining_uses(&self) -> bool {
        match self.max_uses {
            Some(max) => self.usage_count < max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(max_uses: Option<i32>, used: i32, expires_in_hours: Option<i64>) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            code: "LAUNCH10".to_string(),
            kind: DiscountKind::Percentage,
            value: Decimal::new(10, 0),
            max_uses,
            usage_count: used,
            starts_at: now - Duration::hours(1),
            expires_at: expires_in_hours.map(|h| now + Duration::hours(h)),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn exhausted_coupon_has_no_remaining_uses() {
        assert!(coupon(Some(5), 4, None).has_remaining_uses());
        assert!(!coupon(Some(5), 5, None).has_remaining_uses());
        assert!(coupon(None, 10_000, None).has_remaining_uses());
    }

    #[test]
    fn window_check_honors_expiry() {
        assert!(coupon(None, 0, Some(1)).is_within_window(Utc::now()));
        assert!(!coupon(None, 0, Some(-1)).is_within_window(Utc::now()));
        assert!(coupon(None, 0, None).is_within_window(Utc::now()));
    }
}
