//! Quote computation for a registration: resolves the applicable pricing
//! batch, applies an optional coupon, and enforces availability. Pure over a
//! snapshot of persisted state; counters are only mutated later, inside the
//! payment-confirmation transaction.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Batch, Coupon, DiscountKind, Event, Modality};
use crate::utils::error::{AppError, ConflictReason};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("modality has no available slots")]
    SoldOut,

    #[error("event is not open for registration")]
    EventNotOpen,

    #[error("coupon does not apply to this event")]
    CouponWrongEvent,

    #[error("coupon is disabled")]
    CouponDisabled,

    #[error("coupon is outside its validity window")]
    CouponExpired,

    #[error("coupon has no remaining uses")]
    CouponExhausted,

    #[error("quantity must be at least 1")]
    InvalidQuantity,
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        let message = e.to_string();
        match e {
            PricingError::SoldOut => AppError::conflict(ConflictReason::SoldOut, message),
            PricingError::CouponExhausted => {
                AppError::conflict(ConflictReason::CouponExhausted, message)
            }
            PricingError::CouponExpired => {
                AppError::conflict(ConflictReason::CouponExpired, message)
            }
            PricingError::CouponDisabled => {
                AppError::conflict(ConflictReason::CouponDisabled, message)
            }
            PricingError::CouponWrongEvent => AppError::NotFound(message),
            PricingError::EventNotOpen | PricingError::InvalidQuantity => {
                AppError::ValidationError(message)
            }
        }
    }
}

/// Everything `compute` needs, read in one place by the persistence gateway.
#[derive(Debug, Clone)]
pub struct PricingSnapshot {
    pub event: Event,
    pub modality: Modality,
    /// All batches of the event; `compute` picks the applicable one.
    pub batches: Vec<Batch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub unit_price: Decimal,
    pub total: Decimal,
    pub applied_batch_id: Option<Uuid>,
    pub applied_coupon_id: Option<Uuid>,
}

/// Resolves the batch applying at `now`: open window, cap not reached.
/// Among qualifying batches the nearest-to-expiry wins; open-ended windows
/// sort last, equal end dates fall back to `sort_order`, then start date.
pub fn resolve_batch(batches: &[Batch], now: DateTime<Utc>) -> Option<&Batch> {
    batches
        .iter()
        .filter(|b| b.is_open(now))
        .min_by_key(|b| (b.ends_at.is_none(), b.ends_at, b.sort_order, b.starts_at))
}

pub fn compute(
    snapshot: &PricingSnapshot,
    coupon: Option<&Coupon>,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<Quote, PricingError> {
    if quantity == 0 {
        return Err(PricingError::InvalidQuantity);
    }
    if !snapshot.event.is_open_for_registration() {
        return Err(PricingError::EventNotOpen);
    }
    if !snapshot.modality.has_free_slot() {
        return Err(PricingError::SoldOut);
    }

    let batch = resolve_batch(&snapshot.batches, now);
    let resolved = batch.map(|b| b.price).unwrap_or(snapshot.modality.price);

    let discounted = match coupon {
        Some(coupon) => {
            validate_coupon(coupon, snapshot.event.id, now)?;
            apply_discount(resolved, coupon)
        }
        None => resolved,
    };

    let unit_price = round_money(discounted);
    let total = round_money(unit_price * Decimal::from(quantity));

    Ok(Quote {
        unit_price,
        total,
        applied_batch_id: batch.map(|b| b.id),
        applied_coupon_id: coupon.map(|c| c.id),
    })
}

fn validate_coupon(
    coupon: &Coupon,
    event_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), PricingError> {
    if coupon.event_id != event_id {
        return Err(PricingError::CouponWrongEvent);
    }
    if !coupon.enabled {
        return Err(PricingError::CouponDisabled);
    }
    if !coupon.is_within_window(now) {
        return Err(PricingError::CouponExpired);
    }
    if !coupon.has_remaining_uses() {
        return Err(PricingError::CouponExhausted);
    }
    Ok(())
}

/// Percentage discounts apply to the resolved (batch or base) price; fixed
/// discounts subtract and clamp at zero rather than going negative.
fn apply_discount(price: Decimal, coupon: &Coupon) -> Decimal {
    match coupon.kind {
        DiscountKind::Percentage => price - price * coupon.value / Decimal::from(100),
        DiscountKind::Fixed => (price - coupon.value).max(Decimal::ZERO),
    }
}

/// Standard minor-unit rounding: half-up to two decimals.
fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::Duration;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn event(status: EventStatus) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            title: "City Marathon".to_string(),
            slug: "city-marathon".to_string(),
            description: None,
            location: "Riverside Park".to_string(),
            status,
            starts_at: now + Duration::days(30),
            next_registration_number: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn modality(event_id: Uuid, price: &str, capacity: Option<i32>, sold: i32) -> Modality {
        let now = Utc::now();
        Modality {
            id: Uuid::new_v4(),
            event_id,
            name: "10k".to_string(),
            description: None,
            price: dec(price),
            capacity,
            sold_slots: sold,
            created_at: now,
            updated_at: now,
        }
    }

    fn batch(event_id: Uuid, price: &str, ends_in_hours: Option<i64>, sort_order: i32) -> Batch {
        let now = Utc::now();
        Batch {
            id: Uuid::new_v4(),
            event_id,
            name: "batch".to_string(),
            price: dec(price),
            starts_at: now - Duration::hours(1),
            ends_at: ends_in_hours.map(|h| now + Duration::hours(h)),
            sales_limit: None,
            sales_count: 0,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }

    fn coupon(event_id: Uuid, kind: DiscountKind, value: &str) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            event_id,
            code: "PROMO".to_string(),
            kind,
            value: dec(value),
            max_uses: None,
            usage_count: 0,
            starts_at: now - Duration::hours(1),
            expires_at: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(price: &str) -> PricingSnapshot {
        let event = event(EventStatus::Published);
        let modality = modality(event.id, price, None, 0);
        PricingSnapshot {
            event,
            modality,
            batches: vec![],
        }
    }

    #[test]
    fn base_price_when_no_batch_applies() {
        let quote = compute(&snapshot("100.00"), None, 1, Utc::now()).unwrap();
        assert_eq!(quote.unit_price, dec("100.00"));
        assert_eq!(quote.total, dec("100.00"));
        assert_eq!(quote.applied_batch_id, None);
        assert_eq!(quote.applied_coupon_id, None);
    }

    #[test]
    fn ten_percent_coupon_on_hundred_yields_ninety() {
        let snap = snapshot("100.00");
        let c = coupon(snap.event.id, DiscountKind::Percentage, "10");
        let quote = compute(&snap, Some(&c), 1, Utc::now()).unwrap();
        assert_eq!(quote.total, dec("90.00"));
        assert_eq!(quote.applied_coupon_id, Some(c.id));
    }

    #[test]
    fn fixed_coupon_clamps_at_zero() {
        let snap = snapshot("15.00");
        let c = coupon(snap.event.id, DiscountKind::Fixed, "20.00");
        let quote = compute(&snap, Some(&c), 1, Utc::now()).unwrap();
        assert_eq!(quote.total, dec("0.00"));
    }

    #[test]
    fn open_batch_overrides_base_price() {
        let mut snap = snapshot("100.00");
        let b = batch(snap.event.id, "80.00", Some(24), 0);
        let expected = b.id;
        snap.batches.push(b);

        let quote = compute(&snap, None, 1, Utc::now()).unwrap();
        assert_eq!(quote.unit_price, dec("80.00"));
        assert_eq!(quote.applied_batch_id, Some(expected));
    }

    #[test]
    fn nearest_to_expiry_batch_wins() {
        let mut snap = snapshot("100.00");
        let soon = batch(snap.event.id, "70.00", Some(2), 0);
        let later = batch(snap.event.id, "80.00", Some(48), 0);
        let open_ended = batch(snap.event.id, "90.00", None, 0);
        let expected = soon.id;
        snap.batches.extend([later, open_ended, soon]);

        let quote = compute(&snap, None, 1, Utc::now()).unwrap();
        assert_eq!(quote.applied_batch_id, Some(expected));
        assert_eq!(quote.unit_price, dec("70.00"));
    }

    #[test]
    fn capped_out_batch_is_skipped() {
        let mut snap = snapshot("100.00");
        let mut full = batch(snap.event.id, "70.00", Some(2), 0);
        full.sales_limit = Some(50);
        full.sales_count = 50;
        snap.batches.push(full);

        let quote = compute(&snap, None, 1, Utc::now()).unwrap();
        assert_eq!(quote.applied_batch_id, None);
        assert_eq!(quote.unit_price, dec("100.00"));
    }

    #[test]
    fn percentage_discount_applies_to_batch_price() {
        let mut snap = snapshot("100.00");
        snap.batches.push(batch(snap.event.id, "80.00", Some(24), 0));
        let c = coupon(snap.event.id, DiscountKind::Percentage, "25");

        let quote = compute(&snap, Some(&c), 1, Utc::now()).unwrap();
        assert_eq!(quote.total, dec("60.00"));
    }

    #[test]
    fn quantity_multiplies_total() {
        let quote = compute(&snapshot("33.33"), None, 3, Utc::now()).unwrap();
        assert_eq!(quote.unit_price, dec("33.33"));
        assert_eq!(quote.total, dec("99.99"));
    }

    #[test]
    fn rounding_is_half_up_not_bankers() {
        // 10.00 - 0.235 = 9.765: half-up gives 9.77 where round-to-even
        // would give 9.76.
        let snap = snapshot("10.00");
        let c = coupon(snap.event.id, DiscountKind::Fixed, "0.235");
        let quote = compute(&snap, Some(&c), 1, Utc::now()).unwrap();
        assert_eq!(quote.unit_price, dec("9.77"));
    }

    #[test]
    fn sold_out_modality_rejected() {
        let event = event(EventStatus::Published);
        let modality = modality(event.id, "50.00", Some(100), 100);
        let snap = PricingSnapshot {
            event,
            modality,
            batches: vec![],
        };
        assert_eq!(compute(&snap, None, 1, Utc::now()), Err(PricingError::SoldOut));
    }

    #[test]
    fn draft_event_rejected() {
        let event = event(EventStatus::Draft);
        let modality = modality(event.id, "50.00", None, 0);
        let snap = PricingSnapshot {
            event,
            modality,
            batches: vec![],
        };
        assert_eq!(
            compute(&snap, None, 1, Utc::now()),
            Err(PricingError::EventNotOpen)
        );
    }

    #[test]
    fn zero_quantity_rejected() {
        assert_eq!(
            compute(&snapshot("50.00"), None, 0, Utc::now()),
            Err(PricingError::InvalidQuantity)
        );
    }

    #[test]
    fn coupon_from_other_event_rejected() {
        let snap = snapshot("50.00");
        let c = coupon(Uuid::new_v4(), DiscountKind::Percentage, "10");
        assert_eq!(
            compute(&snap, Some(&c), 1, Utc::now()),
            Err(PricingError::CouponWrongEvent)
        );
    }

    #[test]
    fn disabled_expired_and_exhausted_coupons_rejected() {
        let snap = snapshot("50.00");

        let mut disabled = coupon(snap.event.id, DiscountKind::Percentage, "10");
        disabled.enabled = false;
        assert_eq!(
            compute(&snap, Some(&disabled), 1, Utc::now()),
            Err(PricingError::CouponDisabled)
        );

        let mut expired = coupon(snap.event.id, DiscountKind::Percentage, "10");
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        assert_eq!(
            compute(&snap, Some(&expired), 1, Utc::now()),
            Err(PricingError::CouponExpired)
        );

        let mut exhausted = coupon(snap.event.id, DiscountKind::Percentage, "10");
        exhausted.max_uses = Some(5);
        exhausted.usage_count = 5;
        assert_eq!(
            compute(&snap, Some(&exhausted), 1, Utc::now()),
            Err(PricingError::CouponExhausted)
        );
    }

    #[test]
    fn compute_is_deterministic_and_side_effect_free() {
        let mut snap = snapshot("100.00");
        snap.batches.push(batch(snap.event.id, "80.00", Some(24), 0));
        let c = coupon(snap.event.id, DiscountKind::Fixed, "5.00");
        let now = Utc::now();

        let before = (snap.modality.sold_slots, snap.batches[0].sales_count, c.usage_count);
        let first = compute(&snap, Some(&c), 2, now).unwrap();
        let second = compute(&snap, Some(&c), 2, now).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            before,
            (snap.modality.sold_slots, snap.batches[0].sales_count, c.usage_count)
        );
    }

    proptest! {
        #[test]
        fn total_is_never_negative(
            price in 0u64..1_000_000,
            value in 0u64..2_000_000,
            fixed in proptest::bool::ANY,
            quantity in 1u32..10,
        ) {
            let snap = snapshot(&format!("{}.{:02}", price / 100, price % 100));
            let kind = if fixed { DiscountKind::Fixed } else { DiscountKind::Percentage };
            let mut c = coupon(snap.event.id, kind, "0");
            // Percentage capped at 100 by boundary validation; fixed may
            // exceed the price and must clamp.
            c.value = if fixed {
                Decimal::new(value as i64, 2)
            } else {
                Decimal::from(value % 101)
            };

            let quote = compute(&snap, Some(&c), quantity, Utc::now()).unwrap();
            prop_assert!(quote.total >= Decimal::ZERO);
            prop_assert!(quote.unit_price >= Decimal::ZERO);
            prop_assert_eq!(quote.total, round_money(quote.unit_price * Decimal::from(quantity)));
        }
    }
}
