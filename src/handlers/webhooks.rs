use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::models::PaymentStatus;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Deserialize)]
struct PaymentNotification {
    /// Provider's identifier for the payment resource.
    id: String,
    status: String,
}

/// Payment provider webhook receiver. The signature is verified over the
/// raw body before anything is parsed; delivery is at-least-once, so the
/// reconcile step downstream is idempotent.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Missing webhook signature".to_string()))?;

    state.webhooks.verify(&body, signature, Utc::now())?;

    let notification: PaymentNotification = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("Malformed webhook payload: {e}")))?;

    let status = PaymentStatus::parse(&notification.status).ok_or_else(|| {
        AppError::ValidationError(format!(
            "Unknown payment status '{}'",
            notification.status
        ))
    })?;

    let registration = state
        .registrations
        .reconcile_payment(&notification.id, status)
        .await?;

    Ok(success(registration, "Notification processed").into_response())
}
