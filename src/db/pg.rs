//! Postgres gateway. All counter mutations happen inside single
//! transactions with row locks; caps are enforced by conditional UPDATE
//! guards so a losing confirmation rolls back untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
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

pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to connect to database: {e}")))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, AppError> {
        match self.pool.begin().await {
            Ok(tx) => Ok(tx),
            Err(e) if is_transient(&e) => {
                tracing::warn!(error = %e, "Transient error opening transaction, retrying once");
                self.pool.begin().await.map_err(map_db_err)
            }
            Err(e) => Err(map_db_err(e)),
        }
    }

    /// Locks the registration row for the remainder of the transaction.
    async fn lock_registration(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Registration, AppError> {
        sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

fn map_db_err(e: sqlx::Error) -> AppError {
    if is_transient(&e) {
        AppError::Upstream("Database temporarily unavailable".to_string())
    } else {
        AppError::DatabaseError(e)
    }
}

/// Runs a query-building closure, retrying once on a transient error.
macro_rules! retry_once {
    ($op:expr) => {{
        match ($op)().await {
            Err(e) if is_transient(&e) => {
                tracing::warn!(error = %e, "Transient database error, retrying once");
                ($op)().await.map_err(map_db_err)
            }
            other => other.map_err(map_db_err),
        }
    }};
}

#[async_trait]
impl Gateway for PgGateway {
    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (id, name, email) VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .fetch_one(&self.pool)
        })
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
        })
    }

    async fn create_participant(&self, new: NewParticipant) -> Result<Participant, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Participant>(
                "INSERT INTO participants (id, name, email, document, birth_date) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.document)
            .bind(new.birth_date)
            .fetch_one(&self.pool)
        })
    }

    async fn find_participant(&self, id: Uuid) -> Result<Option<Participant>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Participant>("SELECT * FROM participants WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
        })
    }

    async fn create_event(&self, new: NewEvent) -> Result<Event, AppError> {
        let result = sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, organizer_id, title, slug, description, location, status, starts_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.organizer_id)
        .bind(&new.title)
        .bind(&new.slug)
        .bind(&new.description)
        .bind(&new.location)
        .bind(EventStatus::Draft)
        .bind(new.starts_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(event) => Ok(event),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("events_slug_key") => {
                Err(AppError::conflict(
                    ConflictReason::SlugTaken,
                    format!("Slug '{}' is already in use", new.slug),
                ))
            }
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event, AppError> {
        let mut tx = self.begin().await?;

        let current =
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_err)?
                .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let title = patch.title.unwrap_or(current.title);
        let description = patch.description.unwrap_or(current.description);
        let location = patch.location.unwrap_or(current.location);
        let status = patch.status.unwrap_or(current.status);
        let starts_at = patch.starts_at.unwrap_or(current.starts_at);

        let event = sqlx::query_as::<_, Event>(
            "UPDATE events SET title = $2, description = $3, location = $4, status = $5, \
             starts_at = $6, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&title)
        .bind(&description)
        .bind(&location)
        .bind(status)
        .bind(starts_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(event)
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.begin().await?;

        let has_registrations: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM registrations WHERE event_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if has_registrations {
            return Err(AppError::conflict(
                ConflictReason::EventHasRegistrations,
                "Event has registrations and cannot be deleted",
            ));
        }

        // Modalities, batches, coupons and kits cascade via foreign keys.
        let deleted = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("Event not found".to_string()));
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
        })
    }

    async fn find_event_by_slug(&self, slug: &str) -> Result<Option<Event>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
        })
    }

    async fn list_published_events(&self) -> Result<Vec<Event>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Event>(
                "SELECT * FROM events WHERE status = $1 ORDER BY starts_at",
            )
            .bind(EventStatus::Published)
            .fetch_all(&self.pool)
        })
    }

    async fn create_modality(&self, new: NewModality) -> Result<Modality, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Modality>(
                "INSERT INTO modalities (id, event_id, name, description, price, capacity) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(new.event_id)
            .bind(&new.name)
            .bind(&new.description)
            .bind(new.price)
            .bind(new.capacity)
            .fetch_one(&self.pool)
        })
    }

    async fn list_modalities(&self, event_id: Uuid) -> Result<Vec<Modality>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Modality>(
                "SELECT * FROM modalities WHERE event_id = $1 ORDER BY created_at",
            )
            .bind(event_id)
            .fetch_all(&self.pool)
        })
    }

    async fn create_batch(&self, new: NewBatch) -> Result<Batch, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Batch>(
                "INSERT INTO batches (id, event_id, name, price, starts_at, ends_at, sales_limit, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(new.event_id)
            .bind(&new.name)
            .bind(new.price)
            .bind(new.starts_at)
            .bind(new.ends_at)
            .bind(new.sales_limit)
            .bind(new.sort_order)
            .fetch_one(&self.pool)
        })
    }

    async fn list_batches(&self, event_id: Uuid) -> Result<Vec<Batch>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Batch>(
                "SELECT * FROM batches WHERE event_id = $1 ORDER BY sort_order, starts_at",
            )
            .bind(event_id)
            .fetch_all(&self.pool)
        })
    }

    async fn create_coupon(&self, new: NewCoupon) -> Result<Coupon, AppError> {
        let code = new.code.trim().to_uppercase();
        let result = sqlx::query_as::<_, Coupon>(
            "INSERT INTO coupons (id, event_id, code, kind, value, max_uses, starts_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.event_id)
        .bind(&code)
        .bind(new.kind)
        .bind(new.value)
        .bind(new.max_uses)
        .bind(new.starts_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(coupon) => Ok(coupon),
            Err(sqlx::Error::Database(db))
                if db.constraint() == Some("coupons_event_id_code_key") =>
            {
                Err(AppError::ValidationError(format!(
                    "Coupon code '{code}' already exists for this event"
                )))
            }
            Err(e) => Err(map_db_err(e)),
        }
    }

    async fn list_coupons(&self, event_id: Uuid) -> Result<Vec<Coupon>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Coupon>(
                "SELECT * FROM coupons WHERE event_id = $1 ORDER BY code",
            )
            .bind(event_id)
            .fetch_all(&self.pool)
        })
    }

    async fn find_coupon_by_code(
        &self,
        event_id: Uuid,
        code: &str,
    ) -> Result<Option<Coupon>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Coupon>(
                "SELECT * FROM coupons WHERE event_id = $1 AND code = $2",
            )
            .bind(event_id)
            .bind(code)
            .fetch_optional(&self.pool)
        })
    }

    async fn create_kit(&self, new: NewKit) -> Result<Kit, AppError> {
        let mut tx = self.begin().await?;

        let kit = sqlx::query_as::<_, Kit>(
            "INSERT INTO kits (id, event_id, modality_id, name, includes_shirt) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.event_id)
        .bind(new.modality_id)
        .bind(&new.name)
        .bind(new.includes_shirt)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for (size, stock) in &new.shirt_sizes {
            sqlx::query(
                "INSERT INTO kit_shirt_sizes (id, kit_id, size, stock) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(kit.id)
            .bind(size)
            .bind(stock)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(kit)
    }

    async fn kit_for_modality(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<(Kit, Vec<KitShirtSize>)>, AppError> {
        let kit = retry_once!(|| {
            sqlx::query_as::<_, Kit>("SELECT * FROM kits WHERE modality_id = $1")
                .bind(modality_id)
                .fetch_optional(&self.pool)
        })?;

        match kit {
            Some(kit) => {
                let sizes = retry_once!(|| {
                    sqlx::query_as::<_, KitShirtSize>(
                        "SELECT * FROM kit_shirt_sizes WHERE kit_id = $1",
                    )
                    .bind(kit.id)
                    .fetch_all(&self.pool)
                })?;
                Ok(Some((kit, sizes)))
            }
            None => Ok(None),
        }
    }

    async fn pricing_snapshot(
        &self,
        modality_id: Uuid,
    ) -> Result<Option<PricingSnapshot>, AppError> {
        let mut tx = self.begin().await?;

        let Some(modality) =
            sqlx::query_as::<_, Modality>("SELECT * FROM modalities WHERE id = $1")
                .bind(modality_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(modality.event_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?;

        let batches = sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE event_id = $1")
            .bind(event.id)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(Some(PricingSnapshot {
            event,
            modality,
            batches,
        }))
    }

    async fn create_pending(&self, new: NewRegistration) -> Result<Registration, AppError> {
        let mut tx = self.begin().await?;

        // Allocate the per-event sequence; the row lock taken by UPDATE
        // serializes concurrent allocations.
        let number: Option<i32> = sqlx::query_scalar(
            "UPDATE events SET next_registration_number = next_registration_number + 1 \
             WHERE id = $1 RETURNING next_registration_number - 1",
        )
        .bind(new.event_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;
        let number = number.ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        let registration = sqlx::query_as::<_, Registration>(
            "INSERT INTO registrations \
             (id, number, event_id, modality_id, participant_id, buyer_id, coupon_id, batch_id, \
              shirt_size, status, payment_status, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(new.event_id)
        .bind(new.modality_id)
        .bind(new.participant_id)
        .bind(new.buyer_id)
        .bind(new.coupon_id)
        .bind(new.batch_id)
        .bind(new.shirt_size)
        .bind(RegistrationStatus::Pending)
        .bind(PaymentStatus::Pending)
        .bind(new.total)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(registration)
    }

    async fn attach_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
    ) -> Result<Registration, AppError> {
        let mut tx = self.begin().await?;
        let registration = Self::lock_registration(&mut tx, registration_id).await?;

        let registration = match registration.payment_id.as_deref() {
            Some(existing) if existing == payment_id => registration,
            Some(_) => {
                return Err(AppError::conflict(
                    ConflictReason::PaymentAlreadyAttached,
                    "Registration already has a payment identifier",
                ))
            }
            None => sqlx::query_as::<_, Registration>(
                "UPDATE registrations SET payment_id = $2, updated_at = now() \
                 WHERE id = $1 RETURNING *",
            )
            .bind(registration_id)
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_err)?,
        };

        tx.commit().await.map_err(map_db_err)?;
        Ok(registration)
    }

    async fn find_registration(&self, id: Uuid) -> Result<Option<Registration>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Registration>("SELECT * FROM registrations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
        })
    }

    async fn find_registration_by_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Registration>(
                "SELECT * FROM registrations WHERE payment_id = $1",
            )
            .bind(payment_id)
            .fetch_optional(&self.pool)
        })
    }

    async fn list_registrations_for_buyer(
        &self,
        buyer_id: Uuid,
    ) -> Result<Vec<Registration>, AppError> {
        retry_once!(|| {
            sqlx::query_as::<_, Registration>(
                "SELECT * FROM registrations WHERE buyer_id = $1 ORDER BY created_at",
            )
            .bind(buyer_id)
            .fetch_all(&self.pool)
        })
    }

    async fn confirm(&self, registration_id: Uuid) -> Result<Registration, AppError> {
        let mut tx = self.begin().await?;
        let registration = Self::lock_registration(&mut tx, registration_id).await?;

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

        // Each guarded UPDATE re-checks its cap under the row lock; zero
        // rows affected means the cap was hit and the transaction rolls
        // back on drop.
        let slots = sqlx::query(
            "UPDATE modalities SET sold_slots = sold_slots + 1, updated_at = now() \
             WHERE id = $1 AND (capacity IS NULL OR sold_slots < capacity)",
        )
        .bind(registration.modality_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if slots.rows_affected() == 0 {
            return Err(AppError::conflict(
                ConflictReason::SoldOut,
                "Modality is sold out",
            ));
        }

        if let Some(batch_id) = registration.batch_id {
            let sales = sqlx::query(
                "UPDATE batches SET sales_count = sales_count + 1, updated_at = now() \
                 WHERE id = $1 AND (sales_limit IS NULL OR sales_count < sales_limit)",
            )
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
            if sales.rows_affected() == 0 {
                return Err(AppError::conflict(
                    ConflictReason::BatchSoldOut,
                    "Pricing batch is sold out",
                ));
            }
        }

        if let Some(coupon_id) = registration.coupon_id {
            let uses = sqlx::query(
                "UPDATE coupons SET usage_count = usage_count + 1, updated_at = now() \
                 WHERE id = $1 AND (max_uses IS NULL OR usage_count < max_uses)",
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
            if uses.rows_affected() == 0 {
                return Err(AppError::conflict(
                    ConflictReason::CouponExhausted,
                    "Coupon has no remaining uses",
                ));
            }
        }

        if let Some(size) = registration.shirt_size {
            let stock = sqlx::query(
                "UPDATE kit_shirt_sizes SET stock = stock - 1 \
                 WHERE size = $1 AND stock > 0 AND kit_id = \
                 (SELECT id FROM kits WHERE modality_id = $2 AND includes_shirt)",
            )
            .bind(size)
            .bind(registration.modality_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
            if stock.rows_affected() == 0 {
                return Err(AppError::conflict(
                    ConflictReason::KitOutOfStock,
                    format!("Size {} is out of stock", size.as_str()),
                ));
            }
        }

        let registration = sqlx::query_as::<_, Registration>(
            "UPDATE registrations SET status = $2, payment_status = $3, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(registration_id)
        .bind(RegistrationStatus::Confirmed)
        .bind(PaymentStatus::Approved)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(registration)
    }

    async fn cancel(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError> {
        let mut tx = self.begin().await?;
        let registration = Self::lock_registration(&mut tx, registration_id).await?;

        if registration.status != RegistrationStatus::Pending {
            return Err(AppError::conflict(
                ConflictReason::StaleTransition,
                "Registration is no longer pending",
            ));
        }

        let registration = sqlx::query_as::<_, Registration>(
            "UPDATE registrations SET status = $2, payment_status = $3, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(registration_id)
        .bind(RegistrationStatus::Canceled)
        .bind(payment_status)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(registration)
    }

    async fn compensate(
        &self,
        registration_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Registration, AppError> {
        let mut tx = self.begin().await?;
        let registration = Self::lock_registration(&mut tx, registration_id).await?;

        if registration.status != RegistrationStatus::Confirmed {
            return Err(AppError::conflict(
                ConflictReason::StaleTransition,
                "Registration was never confirmed",
            ));
        }

        sqlx::query(
            "UPDATE modalities SET sold_slots = GREATEST(sold_slots - 1, 0), updated_at = now() \
             WHERE id = $1",
        )
        .bind(registration.modality_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if let Some(batch_id) = registration.batch_id {
            sqlx::query(
                "UPDATE batches SET sales_count = GREATEST(sales_count - 1, 0), updated_at = now() \
                 WHERE id = $1",
            )
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        if let Some(coupon_id) = registration.coupon_id {
            sqlx::query(
                "UPDATE coupons SET usage_count = GREATEST(usage_count - 1, 0), updated_at = now() \
                 WHERE id = $1",
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        if let Some(size) = registration.shirt_size {
            sqlx::query(
                "UPDATE kit_shirt_sizes SET stock = stock + 1 \
                 WHERE size = $1 AND kit_id = \
                 (SELECT id FROM kits WHERE modality_id = $2 AND includes_shirt)",
            )
            .bind(size)
            .bind(registration.modality_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        let registration = sqlx::query_as::<_, Registration>(
            "UPDATE registrations SET status = $2, payment_status = $3, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(registration_id)
        .bind(RegistrationStatus::Canceled)
        .bind(payment_status)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(registration)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = retry_once!(|| {
            sqlx::query(
                "UPDATE registrations SET status = $1, updated_at = now() \
                 FROM batches \
                 WHERE registrations.batch_id = batches.id \
                   AND registrations.status = $2 \
                   AND batches.ends_at IS NOT NULL AND batches.ends_at < $3",
            )
            .bind(RegistrationStatus::Expired)
            .bind(RegistrationStatus::Pending)
            .bind(now)
            .execute(&self.pool)
        })?;
        Ok(result.rows_affected())
    }
}
