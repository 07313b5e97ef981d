use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

use super::{require_organizer, require_participant};

pub async fn list_own(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let claims = require_participant(&state, &headers)?;
    let registrations = state.gateway.list_registrations_for_buyer(claims.sub).await?;
    Ok(success(registrations, "Registrations listed").into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let claims = require_participant(&state, &headers)?;
    let registration = state
        .gateway
        .find_registration(id)
        .await?
        .filter(|r| r.buyer_id == claims.sub || r.participant_id == claims.sub)
        .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))?;
    Ok(success(registration, "Registration found").into_response())
}

#[derive(Deserialize)]
pub struct AttachPaymentRequest {
    pub payment_id: String,
}

/// Records the provider's payment identifier once the checkout session is
/// opened on the provider side.
pub async fn attach_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AttachPaymentRequest>,
) -> Result<Response, AppError> {
    let claims = require_participant(&state, &headers)?;
    state
        .gateway
        .find_registration(id)
        .await?
        .filter(|r| r.buyer_id == claims.sub)
        .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))?;

    let registration = state
        .registrations
        .attach_payment(id, body.payment_id.trim())
        .await?;
    Ok(success(registration, "Payment attached").into_response())
}

#[derive(Serialize)]
struct ExpireResult {
    expired: u64,
}

/// Operational sweep: PENDING registrations whose pricing batch closed are
/// marked EXPIRED.
pub async fn expire_overdue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    require_organizer(&state, &headers)?;
    let expired = state.registrations.expire_overdue(Utc::now()).await?;
    Ok(success(ExpireResult { expired }, "Sweep complete").into_response())
}
