//! Registration lifecycle: PENDING -> CONFIRMED | CANCELED | EXPIRED, with a
//! parallel payment status mirrored from the provider.
//!
//! Inventory policy: commit-on-confirmation. Creating a registration only
//! validates availability against a snapshot; batch, coupon and kit counters
//! move inside the confirmation transaction, so abandoned checkouts never
//! hold inventory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{Gateway, NewRegistration};
use crate::models::{PaymentStatus, Registration, RegistrationStatus, ShirtSize};
use crate::pricing::{self, Quote};
use crate::utils::error::{AppError, ConflictReason};

/// What a webhook notification should do to a registration, given its
/// current state. Pure so that every combination can be tested directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Duplicate delivery of a state we already hold.
    NoOp,
    /// First approval: confirm and commit inventory.
    Confirm,
    /// Payment failed before any inventory was committed.
    Cancel,
    /// Approval being undone: cancel and reverse committed inventory.
    Compensate,
    /// Stale or backward notification; kept side-effect free and logged.
    Ignore,
}

/// Decides the reconcile action. Webhooks arrive at least once and possibly
/// out of order, so duplicates no-op and backward transitions from terminal
/// states are ignored rather than applied.
pub fn decide(
    status: RegistrationStatus,
    payment: PaymentStatus,
    incoming: PaymentStatus,
) -> ReconcileAction {
    if incoming == payment {
        return ReconcileAction::NoOp;
    }

    match (status, payment, incoming) {
        // A provider never moves a payment back to pending.
        (_, _, PaymentStatus::Pending) => ReconcileAction::Ignore,

        (RegistrationStatus::Pending, PaymentStatus::Pending, PaymentStatus::Approved) => {
            ReconcileAction::Confirm
        }
        (RegistrationStatus::Pending, PaymentStatus::Pending, PaymentStatus::Rejected) => {
            ReconcileAction::Cancel
        }
        // Refund notice without a prior approval: nothing was committed.
        (RegistrationStatus::Pending, PaymentStatus::Pending, PaymentStatus::Refunded) => {
            ReconcileAction::Cancel
        }

        // Undoing a confirmed registration reverses its counters.
        (
            RegistrationStatus::Confirmed,
            PaymentStatus::Approved,
            PaymentStatus::Refunded | PaymentStatus::Rejected,
        ) => ReconcileAction::Compensate,

        // Rejected and refunded are terminal; expired registrations no
        // longer accept payment outcomes.
        _ => ReconcileAction::Ignore,
    }
}

#[derive(Debug, Clone)]
pub struct CreateRegistration {
    pub modality_id: Uuid,
    pub participant_id: Uuid,
    pub buyer_id: Uuid,
    pub coupon_code: Option<String>,
    pub shirt_size: Option<ShirtSize>,
}

/// Orchestrates creation and payment reconciliation over the persistence
/// gateway.
pub struct RegistrationService {
    gateway: Arc<dyn Gateway>,
}

impl RegistrationService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Prices the registration and persists it as PENDING with a freshly
    /// allocated per-event number. No inventory counters move here.
    pub async fn create_registration(
        &self,
        cmd: CreateRegistration,
    ) -> Result<(Registration, Quote), AppError> {
        let now = Utc::now();

        let snapshot = self
            .gateway
            .pricing_snapshot(cmd.modality_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Modality not found".to_string()))?;

        let coupon = match &cmd.coupon_code {
            Some(code) => {
                let normalized = code.trim().to_uppercase();
                Some(
                    self.gateway
                        .find_coupon_by_code(snapshot.event.id, &normalized)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?,
                )
            }
            None => None,
        };

        let quote = pricing::compute(&snapshot, coupon.as_ref(), 1, now)?;

        self.check_kit(cmd.modality_id, cmd.shirt_size).await?;

        let registration = self
            .gateway
            .create_pending(NewRegistration {
                event_id: snapshot.event.id,
                modality_id: cmd.modality_id,
                participant_id: cmd.participant_id,
                buyer_id: cmd.buyer_id,
                coupon_id: quote.applied_coupon_id,
                batch_id: quote.applied_batch_id,
                shirt_size: cmd.shirt_size,
                total: quote.total,
            })
            .await?;

        tracing::info!(
            registration_id = %registration.id,
            event_id = %registration.event_id,
            number = registration.number,
            total = %registration.total,
            "Registration created"
        );

        Ok((registration, quote))
    }

    /// Snapshot check only; the confirmation transaction re-checks stock
    /// authoritatively.
    async fn check_kit(
        &self,
        modality_id: Uuid,
        shirt_size: Option<ShirtSize>,
    ) -> Result<(), AppError> {
        let kit = self.gateway.kit_for_modality(modality_id).await?;

        match (kit, shirt_size) {
            (Some((kit, sizes)), Some(size)) => {
                if !kit.includes_shirt {
                    return Err(AppError::ValidationError(
                        "This kit does not include a shirt".to_string(),
                    ));
                }
                let in_stock = sizes.iter().any(|s| s.size == size && s.stock > 0);
                if !in_stock {
                    return Err(AppError::conflict(
                        ConflictReason::KitOutOfStock,
                        format!("Size {} is out of stock", size.as_str()),
                    ));
                }
                Ok(())
            }
            (Some((kit, _)), None) if kit.includes_shirt => Err(AppError::ValidationError(
                "A shirt size is required for this modality".to_string(),
            )),
            (None, Some(_)) => Err(AppError::ValidationError(
                "This modality has no kit with a shirt".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub async fn attach_payment(
        &self,
        registration_id: Uuid,
        payment_id: &str,
    ) -> Result<Registration, AppError> {
        if payment_id.trim().is_empty() {
            return Err(AppError::ValidationError(
                "payment_id must not be empty".to_string(),
            ));
        }
        self.gateway.attach_payment(registration_id, payment_id).await
    }

    /// Idempotent under at-least-once webhook delivery: duplicates no-op,
    /// stale transitions are ignored, and the returned registration always
    /// reflects current state.
    pub async fn reconcile_payment(
        &self,
        payment_id: &str,
        incoming: PaymentStatus,
    ) -> Result<Registration, AppError> {
        let registration = self
            .gateway
            .find_registration_by_payment_id(payment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No registration for this payment".to_string())
            })?;

        let action = decide(registration.status, registration.payment_status, incoming);

        tracing::info!(
            registration_id = %registration.id,
            current_status = ?registration.status,
            current_payment = ?registration.payment_status,
            incoming = ?incoming,
            action = ?action,
            "Reconciling payment notification"
        );

        match action {
            ReconcileAction::NoOp => Ok(registration),
            ReconcileAction::Ignore => {
                tracing::warn!(
                    registration_id = %registration.id,
                    incoming = ?incoming,
                    "Ignoring stale payment notification"
                );
                Ok(registration)
            }
            ReconcileAction::Confirm => self.gateway.confirm(registration.id).await,
            ReconcileAction::Cancel => self.gateway.cancel(registration.id, incoming).await,
            ReconcileAction::Compensate => {
                self.gateway.compensate(registration.id, incoming).await
            }
        }
    }

    /// Sweeps PENDING registrations whose pricing batch window has closed.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let expired = self.gateway.expire_overdue(now).await?;
        if expired > 0 {
            tracing::info!(count = expired, "Expired overdue registrations");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_notifications_no_op() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Rejected,
            PaymentStatus::Refunded,
        ] {
            let action = decide(RegistrationStatus::Pending, status, status);
            assert_eq!(action, ReconcileAction::NoOp);
        }
    }

    #[test]
    fn first_approval_confirms() {
        assert_eq!(
            decide(
                RegistrationStatus::Pending,
                PaymentStatus::Pending,
                PaymentStatus::Approved
            ),
            ReconcileAction::Confirm
        );
    }

    #[test]
    fn rejection_before_approval_cancels_without_compensation() {
        assert_eq!(
            decide(
                RegistrationStatus::Pending,
                PaymentStatus::Pending,
                PaymentStatus::Rejected
            ),
            ReconcileAction::Cancel
        );
    }

    #[test]
    fn refund_after_approval_compensates() {
        assert_eq!(
            decide(
                RegistrationStatus::Confirmed,
                PaymentStatus::Approved,
                PaymentStatus::Refunded
            ),
            ReconcileAction::Compensate
        );
        assert_eq!(
            decide(
                RegistrationStatus::Confirmed,
                PaymentStatus::Approved,
                PaymentStatus::Rejected
            ),
            ReconcileAction::Compensate
        );
    }

    #[test]
    fn backward_transitions_from_terminal_states_ignored() {
        // approved after a refund
        assert_eq!(
            decide(
                RegistrationStatus::Canceled,
                PaymentStatus::Refunded,
                PaymentStatus::Approved
            ),
            ReconcileAction::Ignore
        );
        // approved after a rejection
        assert_eq!(
            decide(
                RegistrationStatus::Canceled,
                PaymentStatus::Rejected,
                PaymentStatus::Approved
            ),
            ReconcileAction::Ignore
        );
        // anything back to pending
        assert_eq!(
            decide(
                RegistrationStatus::Confirmed,
                PaymentStatus::Approved,
                PaymentStatus::Pending
            ),
            ReconcileAction::Ignore
        );
    }

    #[test]
    fn expired_registrations_reject_late_approval() {
        assert_eq!(
            decide(
                RegistrationStatus::Expired,
                PaymentStatus::Pending,
                PaymentStatus::Approved
            ),
            ReconcileAction::Ignore
        );
    }
}
