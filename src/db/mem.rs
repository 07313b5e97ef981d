//! In-memory gateway. Mirrors the Postgres implementation's atomic
//! semantics behind a single mutex, which is what makes the lifecycle tests
//! meaningful: every check-and-mutate in `confirm`/`compensate` happens
//! under one lock acquisition, just as the SQL version happens inside one
//! transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Batch, Coupon, Event, EventStatus, Kit, KitShirtSize, Modality, Participant, PaymentStatus,
    Registration, RegistrationStatus, User,
};
use crate::pricing::PricingSnapshot;
use crate::utils::error::{AppError, ConflictReason};

use super::{
    EventPatch, Gateway, NewBatch, NewCoupon, NewEvent, NewKit, NewModality, NewParticipant,
    NewRegistration, NewUser,
};

#[derive(Default)]
struct MemState {
    users: HashMap<Uuid, User>,
    participants: HashMap<Uuid, Participant>,
    events: HashMap<Uuid, Event>,
    modalities: HashMap<Uuid, Modality>,
    batches: HashMap<Uuid, Batch>,
    coupons: HashMap<Uuid, Coupon>,
    kits: HashMap<Uuid, Kit>,
    kit_sizes: HashMap<Uuid, Vec<KitShirtSize>>,
    registrations: HashMap<Uuid, Registration>,
}

#[derive(Default)]
pub struct MemGateway {
    state: Mutex<MemState>,
}

impl MemGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{what} not found"))
}

#[async_trait]
impl Gateway for MemGateway {
    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            provider_account_token: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }

    async fn create_participant(&self, new: NewParticipant) -> Result<Participant, AppError> {
        let now = Utc::now();
        let participant = Participant {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            document: new.document,
            birth_date: new.birth_date,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .participants
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn find_participant(&self, id: Uuid) -> Result<Option<Participant>, AppError> {
        Ok(self.state.lock().unwrap().participants.get(&id).cloned())
    }

    async fn create_event(&self, new: NewEvent) -> Result<Event, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.events.values().any(|e| e.slug == new.slug) {
            return Err(AppError::conflict(
                ConflictReason::SlugTaken,
                format!("Slug '{}' is already in use", new.slug),
            ));
        }
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: new.organizer_id,
            title: new.title,
            slug: new.slug,
            description: new.description,
            location: new.location,
            status: EventStatus::Draft,
            starts_at: new.starts_at,
            next_registration_number: 1,
            created_at: now,
            updated_at: now,
        };
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event, AppError> {
        let mut state = self.state.lock().unwrap();
        let event = state.events.get_mut(&id).ok_or_else(|| not_found("Event"))?;
        if let Some(title) = patch.title {
            event.title = title;
        }
        if let Some(description) = patch.description {
            event.description = description;
        }
        if let Some(location) = patch.location {
            event.location = location;
        }
        if let Some(status) = patch.status {
            event.status = status;
        }
        if let Some(starts_at) = patch.starts_at {
            event.starts_at = starts_at;
        }
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&id) {
            return Err(not_found("Event"));
        }
        if state.registrations.values().any(|r| r.event_id == id) {
            return Err(AppError::conflict(
                ConflictReason::EventHasRegistrations,
                "Event has registrations and cannot be deleted",
            ));
        }
        state.events.remove(&id);
        state.modalities.retain(|_, m| m.event_id != id);
        state.batches.retain(|_, b| b.event_id != id);
        state.coupons.retain(|_, c| c.event_id != id);
        let kit_ids: Vec<Uuid> = state
            .kits
            .values()
            .filter(|k| k.event_id == id)
            .map(|k| k.id)
            .collect();
        for kit_id in kit_ids {
            state.kits.remove(&kit_id);
            state.kit_sizes.remove(&kit_id);
        }
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.state.lock().unwrap().events.get(&id).cloned())
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .find(|e| e.slug == slug)
            .cloned())
    }

    async fn list_published_events(&self) -> Result<Vec<Event>, AppError> {
        let mut events: Vec<Event> = self
            .state
            .lock()
            .unwrap()
            .events
            .values()
            .filter(|e| e.status == EventStatus::Published)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }

    async fn create_modality(&self, new: NewModality) -> Result<Modality, AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&new.event_id) {
            return Err(not_found("Event"));
        }
        let now = Utc::now();
        let modality = Modality {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            name: new.name,
            description: new.description,
            price: new.price,
            capacity: new.capacity,
            sold_slots: 0,
            created_at: now,
            updated_at: now,
        };
        state.modalities.insert(modality.id, modality.clone());
        Ok(modality)
    }

    async fn list_modalities(&self, event_id: Uuid) -> Result<Vec<Modality>, AppError> {
        let mut out: Vec<Modality> = self
            .state
            .lock()
            .unwrap()
            .modalities
            .values()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    async fn create_batch(&self, new: NewBatch) -> Result<Batch, AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&new.event_id) {
            return Err(not_found("Event"));
        }
        let now = Utc::now();
        let batch = Batch {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            name: new.name,
            price: new.price,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            sales_limit: new.sales_limit,
            sales_count: 0,
            sort_order: new.sort_order,
            created_at: now,
            updated_at: now,
        };
        state.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn list_batches(&self, event_id: Uuid) -> Result<Vec<Batch>, AppError> {
        let mut out: Vec<Batch> = self
            .state
            .lock()
            .unwrap()
            .batches
            .values()
            .filter(|b| b.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.sort_order, b.starts_at));
        Ok(out)
    }

    async fn create_coupon(&self, new: NewCoupon) -> Result<Coupon, AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&new.event_id) {
            return Err(not_found("Event"));
        }
        let code = new.code.trim().to_uppercase();
        if state
            .coupons
            .values()
            .any(|c| c.event_id == new.event_id && c.code == code)
        {
            return Err(AppError::ValidationError(format!(
                "Coupon code '{code}' already exists for this event"
            )));
        }
        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            code,
            kind: new.kind,
            value: new.value,
            max_uses: new.max_uses,
            usage_count: 0,
            starts_at: new.starts_at,
            expires_at: new.expires_at,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn list_coupons(&self, event_id: Uuid) -> Result<Vec<Coupon>, AppError> {
        let mut out: Vec<Coupon> = self
            .state
            .lock()
            .unwrap()
            .coupons
            .values()
            .filter(|c| c.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(out)
    }

    async fn find_coupon_by_code(
        &self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .coupons
            .values()
            .find(|c| c.event_id == event_id && c.code == code)
            .cloned())
    }

    async fn create_kit(&self, new: NewKit) -> Result<Kit, AppError> {
        let mut state = self.state.lock().unwrap();
        if !state.modalities.contains_key(&new.modality_id) {
            return Err(not_found("Modality"));
        }
        let now = Utc::now();
        let kit = Kit {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            modality_id: new.modality_id,
            name: new.name,
            includes_shirt: new.includes_shirt,
            created_at: now,
            updated_at: now,
        };
        let sizes = new
            .shirt_sizes
            .into_iter()
            .map(|(size, stock)| KitShirtSize {
                id: Uuid::new_v4(),
                kit_id: kit.id,
                size,
                stock,
            })
            .collect();
        state.kit_sizes.insert(kit.id, sizes);
        state.kits.insert(kit.id, kit.clone());
        Ok(kit)
    }

    async fn kit_for_modality(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<(Kit, Vec<KitShirtSize>)>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .kits
            .values()
            .find(|k| k.modality_id == modality_id)
            .map(|k| {
                (
                    k.clone(),
                    state.kit_sizes.get(&k.id).cloned().unwrap_or_default(),
                )
            }))
    }

    async fn pricing_snapshot(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<PricingSnapshot>, AppError> {
        let state = self.state.lock().unwrap();
        let Some(modality) = state.modalities.get(&modality_id).cloned() else {
            return Ok(None);
        };
        let event = state
            .events
            .get(&modality.event_id)
            .cloned()
            .ok_or_else(|| not_found("Event"))?;
        let batches = state
            .batches
            .values()
            .filter(|b| b.event_id == event.id)
            .cloned()
            .collect();
        Ok(Some(PricingSnapshot {
            event,
            modality,
            batches,
        }))
    }

    async fn create_pending(&self, new: NewRegistration) -> Result<Registration, AppError> {
        let mut state = self.state.lock().unwrap();
        let event = state
            .events
            .get_mut(&new.event_id)
            .ok_or_else(|| not_found("Event"))?;
        let number = event.next_registration_number;
        event.next_registration_number += 1;

        let now = Utc::now();
        let registration = Registration {
            id: Uuid::new_v4(),
            number,
            event_id: new.event_id,
            modality_id: new.modality_id,
            participant_id: new.participant_id,
            buyer_id: new.buyer_id,
            coupon_id: new.coupon_id,
            batch_id: new.batch_id,
            shirt_size: new.shirt_size,
            status: RegistrationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            total: new.total,
            created_at: now,
            updated_at: now,
        };
        state
            .registrations
            .insert(registration.id, registration.clone());
        Ok(registration)
    }

    async fn attach_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
    ) -> Result<Registration, AppError> {
        let mut state = self.state.lock().unwrap();
        let registration = state
            .registrations
            .get_mut(&registration_id)
            .ok_or_else(|| not_found("Registration"))?;
        match &registration.payment_id {
            Some(existing) if existing == payment_id => {}
            Some(_) => {
                return Err(AppError::conflict(
                    ConflictReason::PaymentAlreadyAttached,
                    "Registration already has a payment identifier",
                ))
            }
            None => {
                registration.payment_id = Some(payment_id.to_string());
                registration.updated_at = Utc::now();
            }
        }
        Ok(registration.clone())
    }

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError> {
        Ok(self.state.lock().unwrap().registrations.get(&id).cloned())
    }

    async fn find_registration_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .registrations
            .values()
            .find(|r| r.payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn list_registrations_for_buyer(
        &self,
        buyer_id: Uuid,
    ) -> Result<Vec<Registration>, AppError> {
        let mut out: Vec<Registration> = self
            .state
            .lock()
            .unwrap()
            .registrations
            .values()
            .filter(|r| r.buyer_id == buyer_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn confirm(&self, registration_id: Uuid) -> Result<Registration, AppError> {
        let mut state = self.state.lock().unwrap();

        let registration = state
            .registrations
            .get(&registration_id)
            .cloned()
            .ok_or_else(|| not_found("Registration"))?;

        match registration.status {
            RegistrationStatus::Pending => {}
            // Redelivered approval that already landed.
            RegistrationStatus::Confirmed => return Ok(registration),
            _ => {
                return Err(AppError::conflict(
                    ConflictReason::StaleTransition,
                    "Registration is no longer pending",
                ))
            }
        }

        // Re-check every cap before mutating anything; all checks and all
        // mutations happen under the same lock.
        let modality = state
            .modalities
            .get(&registration.modality_id)
            .ok_or_else(|| not_found("Modality"))?;
        if !modality.has_free_slot() {
            return Err(AppError::conflict(
                ConflictReason::SoldOut,
                "Modality is sold out",
            ));
        }

        if let Some(batch_id) = registration.batch_id {
            let batch = state.batches.get(&batch_id).ok_or_else(|| not_found("Batch"))?;
            if let Some(limit) = batch.sales_limit {
                if batch.sales_count >= limit {
                    return Err(AppError::conflict(
                        ConflictReason::BatchSoldOut,
                        "Pricing batch is sold out",
                    ));
                }
            }
        }

        if let Some(coupon_id) = registration.coupon_id {
            let coupon = state
                .coupons
                .get(&coupon_id)
                .ok_or_else(|| not_found("Coupon"))?;
            if !coupon.has_remaining_uses() {
                return Err(AppError::conflict(
                    ConflictReason::CouponExhausted,
                    "Coupon has no remaining uses",
                ));
            }
        }

        let kit_slot = match registration.shirt_size {
            Some(size) => {
                let kit_id = state
                    .kits
                    .values()
                    .find(|k| k.modality_id == registration.modality_id && k.includes_shirt)
                    .map(|k| k.id)
                    .ok_or_else(|| not_found("Kit"))?;
                let sizes = state.kit_sizes.get(&kit_id).ok_or_else(|| not_found("Kit"))?;
                let idx = sizes.iter().position(|s| s.size == size && s.stock > 0);
                match idx {
                    Some(idx) => Some((kit_id, idx)),
                    None => {
                        return Err(AppError::conflict(
                            ConflictReason::KitOutOfStock,
                            format!("Size {} is out of stock", size.as_str()),
                        ))
                    }
                }
            }
            None => None,
        };

        // All caps hold; apply the mutations.
        let now = Utc::now();
        let modality = state.modalities.get_mut(&registration.modality_id).unwrap();
        modality.sold_slots += 1;
        modality.updated_at = now;

        if let Some(batch_id) = registration.batch_id {
            let batch = state.batches.get_mut(&batch_id).unwrap();
            batch.sales_count += 1;
            batch.updated_at = now;
        }
        if let Some(coupon_id) = registration.coupon_id {
            let coupon = state.coupons.get_mut(&coupon_id).unwrap();
            coupon.usage_count += 1;
            coupon.updated_at = now;
        }
        if let Some((kit_id, idx)) = kit_slot {
            state.kit_sizes.get_mut(&kit_id).unwrap()[idx].stock -= 1;
        }

        let registration = state.registrations.get_mut(&registration_id).unwrap();
        registration.status = RegistrationStatus::Confirmed;
        registration.payment_status = PaymentStatus::Approved;
        registration.updated_at = now;
        Ok(registration.clone())
    }

    async fn cancel(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError> {
        let mut state = self.state.lock().unwrap();
        let registration = state
            .registrations
            .get_mut(&registration_id)
            .ok_or_else(|| not_found("Registration"))?;
        if registration.status != RegistrationStatus::Pending {
            return Err(AppError::conflict(
                ConflictReason::StaleTransition,
                "Registration is no longer pending",
            ));
        }
        registration.status = RegistrationStatus::Canceled;
        registration.payment_status = payment_status;
        registration.updated_at = Utc::now();
        Ok(registration.clone())
    }

    async fn compensate(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError> {
        let mut state = self.state.lock().unwrap();

        let registration = state
            .registrations
            .get(&registration_id)
            .cloned()
            .ok_or_else(|| not_found("Registration"))?;
        if registration.status != RegistrationStatus::Confirmed {
            return Err(AppError::conflict(
                ConflictReason::StaleTransition,
                "Registration was never confirmed",
            ));
        }

        let now = Utc::now();
        if let Some(modality) = state.modalities.get_mut(&registration.modality_id) {
            modality.sold_slots = (modality.sold_slots - 1).max(0);
            modality.updated_at = now;
        }
        if let Some(batch_id) = registration.batch_id {
            if let Some(batch) = state.batches.get_mut(&batch_id) {
                batch.sales_count = (batch.sales_count - 1).max(0);
                batch.updated_at = now;
            }
        }
        if let Some(coupon_id) = registration.coupon_id {
            if let Some(coupon) = state.coupons.get_mut(&coupon_id) {
                coupon.usage_count = (coupon.usage_count - 1).max(0);
                coupon.updated_at = now;
            }
        }
        if let Some(size) = registration.shirt_size {
            let kit_id = state
                .kits
                .values()
                .find(|k| k.modality_id == registration.modality_id && k.includes_shirt)
                .map(|k| k.id);
            if let Some(kit_id) = kit_id {
                if let Some(sizes) = state.kit_sizes.get_mut(&kit_id) {
                    if let Some(slot) = sizes.iter_mut().find(|s| s.size == size) {
                        slot.stock += 1;
                    }
                }
            }
        }

        let registration = state.registrations.get_mut(&registration_id).unwrap();
        registration.status = RegistrationStatus::Canceled;
        registration.payment_status = payment_status;
        registration.updated_at = now;
        Ok(registration.clone())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let closed_batches: Vec<Uuid> = state
            .batches
            .values()
            .filter(|b| b.ends_at.is_some_and(|e| e < now))
            .map(|b| b.id)
            .collect();

        let mut expired = 0;
        for registration in state.registrations.values_mut() {
            if registration.status == RegistrationStatus::Pending
                && registration
                    .batch_id
                    .is_some_and(|id| closed_batches.contains(&id))
            {
                registration.status = RegistrationStatus::Expired;
                registration.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}
