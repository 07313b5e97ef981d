use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{PrincipalKind, TokenPair};
use crate::db::{NewParticipant, NewUser};
use crate::models::{Participant, User};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Exchanges a refresh token for a fresh access/refresh pair.
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    let claims = state.tokens.verify_refresh(&body.refresh_token)?;
    let pair = state.tokens.issue(claims.sub, claims.kind)?;
    Ok(success(pair, "Token refreshed").into_response())
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

impl CreateUserRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        validate_email(&self.email)
    }
}

#[derive(Serialize)]
struct UserCreated {
    user: User,
    tokens: TokenPair,
}

/// Creates an organizer account and issues its first token pair.
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<Response, AppError> {
    body.validate()?;
    let user = state
        .gateway
        .create_user(NewUser {
            name: body.name.trim().to_string(),
            email: body.email.trim().to_lowercase(),
        })
        .await?;
    let tokens = state.tokens.issue(user.id, PrincipalKind::Organizer)?;
    Ok(created(UserCreated { user, tokens }, "User created").into_response())
}

#[derive(Deserialize)]
pub struct CreateParticipantRequest {
    pub name: String,
    pub email: String,
    pub document: Option<String>,
    pub birth_date: Option<chrono::NaiveDate>,
}

impl CreateParticipantRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        validate_email(&self.email)
    }
}

#[derive(Serialize)]
struct ParticipantCreated {
    participant: Participant,
    tokens: TokenPair,
}

pub async fn create_participant(
    State(state): State<AppState>,
    Json(body): Json<CreateParticipantRequest>,
) -> Result<Response, AppError> {
    body.validate()?;
    let participant = state
        .gateway
        .create_participant(NewParticipant {
            name: body.name.trim().to_string(),
            email: body.email.trim().to_lowercase(),
            document: body.document,
            birth_date: body.birth_date,
        })
        .await?;
    let tokens = state.tokens.issue(participant.id, PrincipalKind::Participant)?;
    Ok(created(
        ParticipantCreated {
            participant,
            tokens,
        },
        "Participant created",
    )
    .into_response())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let well_formed = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
    });
    if !well_formed {
        return Err(AppError::ValidationError(
            "email is not a valid address".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("runner@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }
}
