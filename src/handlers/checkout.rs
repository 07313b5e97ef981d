use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Registration, ShirtSize};
use crate::pricing::{self, Quote};
use crate::registration::CreateRegistration;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

use super::require_participant;

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub modality_id: Uuid,
    pub coupon_code: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Price preview: pure snapshot computation, no state is written.
pub async fn quote(
    State(state): State<AppState>,
    Json(body): Json<QuoteRequest>,
) -> Result<Response, AppError> {
    let snapshot = state
        .gateway
        .pricing_snapshot(body.modality_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Modality not found".to_string()))?;

    let coupon = match &body.coupon_code {
        Some(code) => Some(
            state
                .gateway
                .find_coupon_by_code(snapshot.event.id, &code.trim().to_uppercase())
                .await?
                .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?,
        ),
        None => None,
    };

    let quote = pricing::compute(&snapshot, coupon.as_ref(), body.quantity, Utc::now())?;
    Ok(success(quote, "Quote computed").into_response())
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub modality_id: Uuid,
    pub coupon_code: Option<String>,
    pub shirt_size: Option<ShirtSize>,
    /// The attendee; defaults to the buyer registering themselves.
    pub participant_id: Option<Uuid>,
}

#[derive(Serialize)]
struct CheckoutResponse {
    registration: Registration,
    quote: Quote,
}

pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    let claims = require_participant(&state, &headers)?;
    let buyer_id = claims.sub;
    let participant_id = body.participant_id.unwrap_or(buyer_id);

    if state.gateway.find_participant(participant_id).await?.is_none() {
        return Err(AppError::NotFound("Participant not found".to_string()));
    }

    let (registration, quote) = state
        .registrations
        .create_registration(CreateRegistration {
            modality_id: body.modality_id,
            participant_id,
            buyer_id,
            coupon_code: body.coupon_code,
            shirt_size: body.shirt_size,
        })
        .await?;

    Ok(created(
        CheckoutResponse {
            registration,
            quote,
        },
        "Registration created",
    )
    .into_response())
}
