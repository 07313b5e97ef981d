//! Registration lifecycle tests over the in-memory gateway: capacity under
//! concurrency, webhook idempotency, compensation, and the full
//! checkout-to-confirmation path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use startline::db::{
    EventPatch, Gateway, MemGateway, NewBatch, NewCoupon, NewEvent, NewKit, NewModality,
    NewParticipant, NewUser,
};
use startline::models::{
    DiscountKind, Event, EventStatus, Modality, Participant, PaymentStatus, RegistrationStatus,
    ShirtSize,
};
use startline::registration::{CreateRegistration, RegistrationService};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

struct Fixture {
    gateway: Arc<MemGateway>,
    service: RegistrationService,
    event: Event,
    modality: Modality,
    participant: Participant,
}

impl Fixture {
    /// Published event with one modality; capacity and price as given.
    async fn new(price: &str, capacity: Option<i32>) -> Self {
        let gateway = Arc::new(MemGateway::new());
        let service = RegistrationService::new(gateway.clone() as Arc<dyn Gateway>);

        let organizer = gateway
            .create_user(NewUser {
                name: "Org".to_string(),
                email: "org@example.com".to_string(),
            })
            .await
            .unwrap();

        let event = gateway
            .create_event(NewEvent {
                organizer_id: organizer.id,
                title: "City Marathon".to_string(),
                slug: "city-marathon".to_string(),
                description: None,
                location: "Riverside Park".to_string(),
                starts_at: Utc::now() + Duration::days(30),
            })
            .await
            .unwrap();
        let event = gateway
            .update_event(
                event.id,
                EventPatch {
                    status: Some(EventStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let modality = gateway
            .create_modality(NewModality {
                event_id: event.id,
                name: "10k".to_string(),
                description: None,
                price: dec(price),
                capacity,
            })
            .await
            .unwrap();

        let participant = gateway
            .create_participant(NewParticipant {
                name: "Runner".to_string(),
                email: "runner@example.com".to_string(),
                document: None,
                birth_date: None,
            })
            .await
            .unwrap();

        Self {
            gateway,
            service,
            event,
            modality,
            participant,
        }
    }

    async fn participant(&self, email: &str) -> Participant {
        self.gateway
            .create_participant(NewParticipant {
                name: "Runner".to_string(),
                email: email.to_string(),
                document: None,
                birth_date: None,
            })
            .await
            .unwrap()
    }

    fn registration_cmd(&self, participant: &Participant) -> CreateRegistration {
        CreateRegistration {
            modality_id: self.modality.id,
            participant_id: participant.id,
            buyer_id: participant.id,
            coupon_code: None,
            shirt_size: None,
        }
    }

    async fn sold_slots(&self) -> i32 {
        self.gateway
            .pricing_snapshot(self.modality.id)
            .await
            .unwrap()
            .unwrap()
            .modality
            .sold_slots
    }
}

#[tokio::test]
async fn end_to_end_checkout_and_sell_out() {
    let fx = Fixture::new("50.00", Some(1)).await;

    let (registration, quote) = fx
        .service
        .create_registration(fx.registration_cmd(&fx.participant))
        .await
        .unwrap();
    assert_eq!(registration.status, RegistrationStatus::Pending);
    assert_eq!(registration.number, 1);
    assert_eq!(quote.total, dec("50.00"));
    assert_eq!(registration.total, dec("50.00"));

    fx.service
        .attach_payment(registration.id, "pay_a")
        .await
        .unwrap();

    let confirmed = fx
        .service
        .reconcile_payment("pay_a", PaymentStatus::Approved)
        .await
        .unwrap();
    assert_eq!(confirmed.status, RegistrationStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Approved);
    assert_eq!(fx.sold_slots().await, 1);

    // The modality is now full; a second checkout is rejected at creation.
    let other = fx.participant("second@example.com").await;
    let err = fx
        .service
        .create_registration(fx.registration_cmd(&other))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SOLD_OUT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_never_oversold_under_concurrency() {
    const CAPACITY: i32 = 3;
    const ATTEMPTS: usize = 7;

    let fx = Fixture::new("50.00", Some(CAPACITY)).await;
    let service = Arc::new(RegistrationService::new(
        fx.gateway.clone() as Arc<dyn Gateway>
    ));

    // All attempts check out while no slot is taken yet, so every pending
    // registration is created; the confirmation step is where the capacity
    // fight happens.
    let mut payment_ids = Vec::new();
    for i in 0..ATTEMPTS {
        let participant = fx.participant(&format!("runner{i}@example.com")).await;
        let (registration, _) = service
            .create_registration(fx.registration_cmd(&participant))
            .await
            .unwrap();
        let payment_id = format!("pay_{i}");
        service
            .attach_payment(registration.id, &payment_id)
            .await
            .unwrap();
        payment_ids.push(payment_id);
    }

    let mut handles = Vec::new();
    for payment_id in payment_ids {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .reconcile_payment(&payment_id, PaymentStatus::Approved)
                .await
        }));
    }

    let mut confirmed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(r) => {
                assert_eq!(r.status, RegistrationStatus::Confirmed);
                confirmed += 1;
            }
            Err(e) => {
                assert_eq!(e.code(), "SOLD_OUT");
                sold_out += 1;
            }
        }
    }

    assert_eq!(confirmed, CAPACITY as usize);
    assert_eq!(sold_out, ATTEMPTS - CAPACITY as usize);
    assert_eq!(fx.sold_slots().await, CAPACITY);
}

#[tokio::test]
async fn duplicate_approval_increments_once() {
    let fx = Fixture::new("100.00", None).await;

    let batch = fx
        .gateway
        .create_batch(NewBatch {
            event_id: fx.event.id,
            name: "early bird".to_string(),
            price: dec("80.00"),
            starts_at: Utc::now() - Duration::hours(1),
            ends_at: Some(Utc::now() + Duration::hours(24)),
            sales_limit: None,
            sort_order: 0,
        })
        .await
        .unwrap();

    fx.gateway
        .create_coupon(NewCoupon {
            event_id: fx.event.id,
            code: "LAUNCH10".to_string(),
            kind: DiscountKind::Percentage,
            value: dec("10"),
            max_uses: Some(5),
            starts_at: Utc::now() - Duration::hours(1),
            expires_at: None,
        })
        .await
        .unwrap();

    let (registration, quote) = fx
        .service
        .create_registration(CreateRegistration {
            coupon_code: Some("launch10".to_string()),
            ..fx.registration_cmd(&fx.participant)
        })
        .await
        .unwrap();
    assert_eq!(quote.applied_batch_id, Some(batch.id));
    assert_eq!(quote.total, dec("72.00"));

    fx.service
        .attach_payment(registration.id, "pay_dup")
        .await
        .unwrap();

    for _ in 0..3 {
        let reconciled = fx
            .service
            .reconcile_payment("pay_dup", PaymentStatus::Approved)
            .await
            .unwrap();
        assert_eq!(reconciled.status, RegistrationStatus::Confirmed);
    }

    let batches = fx.gateway.list_batches(fx.event.id).await.unwrap();
    assert_eq!(batches[0].sales_count, 1);
    let coupon = fx
        .gateway
        .find_coupon_by_code(fx.event.id, "LAUNCH10")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.usage_count, 1);
    assert_eq!(fx.sold_slots().await, 1);
}

#[tokio::test]
async fn exhausted_coupon_rejected_at_creation() {
    let fx = Fixture::new("50.00", None).await;

    fx.gateway
        .create_coupon(NewCoupon {
            event_id: fx.event.id,
            code: "ONCE".to_string(),
            kind: DiscountKind::Fixed,
            value: dec("5.00"),
            max_uses: Some(1),
            starts_at: Utc::now() - Duration::hours(1),
            expires_at: None,
        })
        .await
        .unwrap();

    // First use: checkout and confirm, consuming the only use.
    let (registration, _) = fx
        .service
        .create_registration(CreateRegistration {
            coupon_code: Some("ONCE".to_string()),
            ..fx.registration_cmd(&fx.participant)
        })
        .await
        .unwrap();
    fx.service
        .attach_payment(registration.id, "pay_once")
        .await
        .unwrap();
    fx.service
        .reconcile_payment("pay_once", PaymentStatus::Approved)
        .await
        .unwrap();

    let other = fx.participant("late@example.com").await;
    let err = fx
        .service
        .create_registration(CreateRegistration {
            coupon_code: Some("ONCE".to_string()),
            ..fx.registration_cmd(&other)
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COUPON_EXHAUSTED");
}

#[tokio::test]
async fn refund_compensates_counters_and_kit_stock() {
    let fx = Fixture::new("50.00", Some(10)).await;

    fx.gateway
        .create_kit(NewKit {
            event_id: fx.event.id,
            modality_id: fx.modality.id,
            name: "race kit".to_string(),
            includes_shirt: true,
            shirt_sizes: vec![(ShirtSize::M, 1), (ShirtSize::L, 0)],
        })
        .await
        .unwrap();

    let (registration, _) = fx
        .service
        .create_registration(CreateRegistration {
            shirt_size: Some(ShirtSize::M),
            ..fx.registration_cmd(&fx.participant)
        })
        .await
        .unwrap();
    fx.service
        .attach_payment(registration.id, "pay_refund")
        .await
        .unwrap();
    fx.service
        .reconcile_payment("pay_refund", PaymentStatus::Approved)
        .await
        .unwrap();

    let (_, sizes) = fx
        .gateway
        .kit_for_modality(fx.modality.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sizes.iter().find(|s| s.size == ShirtSize::M).unwrap().stock, 0);
    assert_eq!(fx.sold_slots().await, 1);

    let refunded = fx
        .service
        .reconcile_payment("pay_refund", PaymentStatus::Refunded)
        .await
        .unwrap();
    assert_eq!(refunded.status, RegistrationStatus::Canceled);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);

    let (_, sizes) = fx
        .gateway
        .kit_for_modality(fx.modality.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sizes.iter().find(|s| s.size == ShirtSize::M).unwrap().stock, 1);
    assert_eq!(fx.sold_slots().await, 0);

    // A late approval for the refunded payment is ignored, not re-applied.
    let late = fx
        .service
        .reconcile_payment("pay_refund", PaymentStatus::Approved)
        .await
        .unwrap();
    assert_eq!(late.status, RegistrationStatus::Canceled);
    assert_eq!(fx.sold_slots().await, 0);
}

#[tokio::test]
async fn out_of_stock_shirt_size_rejected() {
    let fx = Fixture::new("50.00", None).await;

    fx.gateway
        .create_kit(NewKit {
            event_id: fx.event.id,
            modality_id: fx.modality.id,
            name: "race kit".to_string(),
            includes_shirt: true,
            shirt_sizes: vec![(ShirtSize::S, 0)],
        })
        .await
        .unwrap();

    let err = fx
        .service
        .create_registration(CreateRegistration {
            shirt_size: Some(ShirtSize::S),
            ..fx.registration_cmd(&fx.participant)
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "KIT_OUT_OF_STOCK");

    // Missing size for a shirt kit is a validation problem, not a conflict.
    let err = fx
        .service
        .create_registration(fx.registration_cmd(&fx.participant))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn rejection_before_approval_cancels_without_counters() {
    let fx = Fixture::new("50.00", Some(5)).await;

    let (registration, _) = fx
        .service
        .create_registration(fx.registration_cmd(&fx.participant))
        .await
        .unwrap();
    fx.service
        .attach_payment(registration.id, "pay_reject")
        .await
        .unwrap();

    let canceled = fx
        .service
        .reconcile_payment("pay_reject", PaymentStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(canceled.status, RegistrationStatus::Canceled);
    assert_eq!(canceled.payment_status, PaymentStatus::Rejected);
    assert_eq!(fx.sold_slots().await, 0);
}

#[tokio::test]
async fn payment_id_attaches_at_most_once() {
    let fx = Fixture::new("50.00", None).await;

    let (registration, _) = fx
        .service
        .create_registration(fx.registration_cmd(&fx.participant))
        .await
        .unwrap();

    fx.service
        .attach_payment(registration.id, "pay_1")
        .await
        .unwrap();
    // Same id again is an idempotent no-op.
    fx.service
        .attach_payment(registration.id, "pay_1")
        .await
        .unwrap();

    let err = fx
        .service
        .attach_payment(registration.id, "pay_2")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT_ALREADY_ATTACHED");
}

#[tokio::test]
async fn registration_numbers_are_sequential_per_event() {
    let fx = Fixture::new("50.00", None).await;

    for expected in 1..=3 {
        let participant = fx.participant(&format!("n{expected}@example.com")).await;
        let (registration, _) = fx
            .service
            .create_registration(fx.registration_cmd(&participant))
            .await
            .unwrap();
        assert_eq!(registration.number, expected);
    }
}

#[tokio::test]
async fn pending_registrations_expire_when_batch_closes() {
    let fx = Fixture::new("100.00", None).await;

    fx.gateway
        .create_batch(NewBatch {
            event_id: fx.event.id,
            name: "early bird".to_string(),
            price: dec("80.00"),
            starts_at: Utc::now() - Duration::hours(1),
            ends_at: Some(Utc::now() + Duration::hours(1)),
            sales_limit: None,
            sort_order: 0,
        })
        .await
        .unwrap();

    let (registration, quote) = fx
        .service
        .create_registration(fx.registration_cmd(&fx.participant))
        .await
        .unwrap();
    assert!(quote.applied_batch_id.is_some());

    // Nothing to expire while the batch window is still open.
    assert_eq!(fx.service.expire_overdue(Utc::now()).await.unwrap(), 0);

    let after_close = Utc::now() + Duration::hours(2);
    assert_eq!(fx.service.expire_overdue(after_close).await.unwrap(), 1);

    let expired = fx
        .gateway
        .find_registration(registration.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired.status, RegistrationStatus::Expired);

    // A payment approved after expiry is ignored.
    fx.gateway
        .attach_payment(registration.id, "pay_late")
        .await
        .unwrap();
    let late = fx
        .service
        .reconcile_payment("pay_late", PaymentStatus::Approved)
        .await
        .unwrap();
    assert_eq!(late.status, RegistrationStatus::Expired);
    assert_eq!(fx.sold_slots().await, 0);
}

#[tokio::test]
async fn unknown_payment_id_is_not_found() {
    let fx = Fixture::new("50.00", None).await;
    let err = fx
        .service
        .reconcile_payment("pay_ghost", PaymentStatus::Approved)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
