use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Canceled,
    Expired,
}

impl RegistrationStatus {
    /// Confirmed, canceled and expired registrations never transition again
    /// except for a refund flipping the payment status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RegistrationStatus::Pending)
    }
}

/// Mirrors the payment provider's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Refunded,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    /// Human-readable number, sequential per event.
    pub number: i32,
    pub event_id: Uuid,
    pub modality_id: Uuid,
    /// The person attending.
    pub participant_id: Uuid,
    /// The account that paid; equals `participant_id` for self-registration.
    pub buyer_id: Uuid,
    pub coupon_id: Option<Uuid>,
    /// Batch whose price was applied at checkout, if any.
    pub batch_id: Option<Uuid>,
    pub shirt_size: Option<super::ShirtSize>,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    /// Provider identifier; set at most once, after the provider accepts the
    /// charge attempt.
    pub payment_id: Option<String>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!RegistrationStatus::Pending.is_terminal());
        assert!(RegistrationStatus::Confirmed.is_terminal());
        assert!(RegistrationStatus::Canceled.is_terminal());
        assert!(RegistrationStatus::Expired.is_terminal());
    }

    #[test]
    fn payment_status_parses_provider_vocabulary() {
        assert_eq!(PaymentStatus::parse("approved"), Some(PaymentStatus::Approved));
        assert_eq!(PaymentStatus::parse("chargeback"), None);
    }
}
