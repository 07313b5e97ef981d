use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

/// Machine-readable reason codes for `409 Conflict` responses.
///
/// Clients branch on these, so they are part of the API contract and must
/// stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    SoldOut,
    BatchSoldOut,
    CouponExhausted,
    CouponExpired,
    CouponDisabled,
    KitOutOfStock,
    PaymentAlreadyAttached,
    StaleTransition,
    EventHasRegistrations,
    SlugTaken,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::SoldOut => "SOLD_OUT",
            ConflictReason::BatchSoldOut => "BATCH_SOLD_OUT",
            ConflictReason::CouponExhausted => "COUPON_EXHAUSTED",
            ConflictReason::CouponExpired => "COUPON_EXPIRED",
            ConflictReason::CouponDisabled => "COUPON_DISABLED",
            ConflictReason::KitOutOfStock => "KIT_OUT_OF_STOCK",
            ConflictReason::PaymentAlreadyAttached => "PAYMENT_ALREADY_ATTACHED",
            ConflictReason::StaleTransition => "STALE_TRANSITION",
            ConflictReason::EventHasRegistrations => "EVENT_HAS_REGISTRATIONS",
            ConflictReason::SlugTaken => "SLUG_TAKEN",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict ({}): {message}", reason.as_str())]
    Conflict {
        reason: ConflictReason,
        message: String,
    },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn conflict(reason: ConflictReason, message: impl Into<String>) -> Self {
        AppError::Conflict {
            reason,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict { reason, .. } => reason.as_str(),
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::Conflict { reason, message } => {
                warn!(reason = reason.as_str(), message = %message, "Domain conflict");
            }
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => {
                warn!(error = ?self, message = %msg, "Request rejected");
            }
            AppError::Upstream(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Upstream(msg) => msg.clone(),
            AppError::Conflict { message, .. } => message.clone(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409_with_reason_code() {
        let err = AppError::conflict(ConflictReason::SoldOut, "no slots left");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SOLD_OUT");
    }

    #[test]
    fn upstream_maps_to_503() {
        let err = AppError::Upstream("database unreachable".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
    }

    #[test]
    fn database_errors_redact_internal_detail() {
        let err = AppError::DatabaseError(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
