use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::auth::{Claims, PrincipalKind};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod auth;
pub mod checkout;
pub mod events;
pub mod registrations;
pub mod webhooks;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "startline-api",
    };

    success(payload, "Health check successful").into_response()
}

/// Pulls the bearer token out of the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    state.tokens.verify_access(bearer_token(headers)?)
}

/// Access-token check for organizer-only endpoints.
fn require_organizer(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    let claims = authenticate(state, headers)?;
    if claims.kind != PrincipalKind::Organizer {
        return Err(AppError::Forbidden(
            "Organizer account required".to_string(),
        ));
    }
    Ok(claims)
}

fn require_participant(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    let claims = authenticate(state, headers)?;
    if claims.kind != PrincipalKind::Participant {
        return Err(AppError::Forbidden(
            "Participant account required".to_string(),
        ));
    }
    Ok(claims)
}
