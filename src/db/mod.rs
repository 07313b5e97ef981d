//! Persistence gateway: the only component that touches storage. Constructed
//! explicitly at startup and injected into handlers, never held as ambient
//! global state.
//!
//! The `Gateway` trait is the seam between domain logic and storage. The
//! Postgres implementation backs production; the in-memory implementation
//! backs lifecycle tests and local demos with the same atomic semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Batch, Coupon, DiscountKind, Event, EventStatus, Kit, KitShirtSize, Modality, Participant,
    PaymentStatus, Registration, ShirtSize, User,
};
use crate::pricing::PricingSnapshot;
use crate::utils::error::AppError;

pub mod mem;
pub mod pg;

pub use mem::MemGateway;
pub use pg::PgGateway;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub name: String,
    pub email: String,
    pub document: Option<String>,
    pub birth_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub organizer_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub location: String,
    pub starts_at: DateTime<Utc>,
}

/// Partial update; None leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub starts_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewModality {
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub capacity: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub sales_limit: Option<i32>,
    pub sort_order: i32,
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub event_id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub max_uses: Option<i32>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewKit {
    pub event_id: Uuid,
    pub modality_id: Uuid,
    pub name: String,
    pub includes_shirt: bool,
    /// (size, initial stock); empty when no shirt is included.
    pub shirt_sizes: Vec<(ShirtSize, i32)>,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub event_id: Uuid,
    pub modality_id: Uuid,
    pub participant_id: Uuid,
    pub buyer_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub shirt_size: Option<ShirtSize>,
    pub total: Decimal,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    // -- identities ------------------------------------------------------

    async fn create_user(&self, new: NewUser) -> Result<User, AppError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn create_participant(&self, new: NewParticipant) -> Result<Participant, AppError>;
    async fn find_participant(&self, id: Uuid) -> Result<Option<Participant>, AppError>;

    // -- events and their owned resources --------------------------------

    async fn create_event(&self, new: NewEvent) -> Result<Event, AppError>;
    async fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event, AppError>;
    /// Blocked with a conflict while registrations reference the event.
    async fn delete_event(&self, id: Uuid) -> Result<(), AppError>;
    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError>;
    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError>;
    async fn list_published_events(&self) -> Result<Vec<Event>, AppError>;

    async fn create_modality(&self, new: NewModality) -> Result<Modality, AppError>;
    async fn list_modalities(&self, event_id: Uuid) -> Result<Vec<Modality>, AppError>;
    async fn create_batch(&self, new: NewBatch) -> Result<Batch, AppError>;
    async fn list_batches(&self, event_id: Uuid) -> Result<Vec<Batch>, AppError>;
    async fn create_coupon(&self, new: NewCoupon) -> Result<Coupon, AppError>;
    async fn list_coupons(&self, event_id: Uuid) -> Result<Vec<Coupon>, AppError>;
    async fn find_coupon_by_code(
        &self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError>;
    async fn create_kit(&self, new: NewKit) -> Result<Kit, AppError>;
    async fn kit_for_modality(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<(Kit, Vec<KitShirtSize>)>, AppError>;

    // -- pricing reads ---------------------------------------------------

    /// Event, modality and batches in one consistent read; None when the
    /// modality does not exist.
    async fn pricing_snapshot(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<PricingSnapshot>, AppError>;

    // -- registration lifecycle ------------------------------------------

    /// Persists a PENDING registration, allocating the next per-event
    /// registration number atomically. Increments no inventory counters.
    async fn create_pending(&self, new: NewRegistration) -> Result<Registration, AppError>;

    /// Records the provider's payment identifier; set at most once.
    async fn attach_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
    ) -> Result<Registration, AppError>;

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError>;
    async fn find_registration_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError>;
    async fn list_registrations_for_buyer(
        &self,
        buyer_id: Uuid,
    ) -> Result<Vec<Registration>, AppError>;

    /// One atomic transaction: registration -> CONFIRMED/approved, modality
    /// sold_slots++, applied batch sales_count++, used coupon usage_count++,
    /// kit shirt stock--. Caps are re-checked under row locks; a loser gets
    /// the matching conflict and nothing is mutated.
    async fn confirm(&self, registration_id: Uuid) -> Result<Registration, AppError>;

    /// Terminal transition with no counters to touch (payment never
    /// approved): registration -> CANCELED with the given payment status.
    async fn cancel(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError>;

    /// Reverses a prior confirmation in one transaction: registration ->
    /// CANCELED with the given payment status, counters decremented.
    async fn compensate(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError>;

    /// Marks PENDING registrations whose applied batch window closed before
    /// `now` as EXPIRED. Returns how many were expired.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
