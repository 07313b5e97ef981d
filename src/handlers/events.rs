use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{EventPatch, NewBatch, NewCoupon, NewEvent, NewKit, NewModality};
use crate::models::event::is_valid_slug;
use crate::models::{DiscountKind, Event, EventStatus, ShirtSize};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

use super::require_organizer;

/// Loads an event and hides it from non-owners, per the ownership contract:
/// a resource you do not own looks absent.
async fn owned_event(
    state: &AppState,
    event_id: Uuid,
    organizer_id: Uuid,
) -> Result<Event, AppError> {
    let event = state
        .gateway
        .find_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
    if event.organizer_id != organizer_id {
        return Err(AppError::NotFound("Event not found".to_string()));
    }
    Ok(event)
}

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub location: String,
    pub starts_at: DateTime<Utc>,
}

impl CreateEventRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("title must not be empty".to_string()));
        }
        if !is_valid_slug(&self.slug) {
            return Err(AppError::ValidationError(
                "slug must be lowercase alphanumerics and hyphens".to_string(),
            ));
        }
        if self.location.trim().is_empty() {
            return Err(AppError::ValidationError(
                "location must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    body.validate()?;

    let event = state
        .gateway
        .create_event(NewEvent {
            organizer_id: claims.sub,
            title: body.title.trim().to_string(),
            slug: body.slug,
            description: body.description,
            location: body.location.trim().to_string(),
            starts_at: body.starts_at,
        })
        .await?;
    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.gateway.list_published_events().await?;
    Ok(success(events, "Events listed").into_response())
}

pub async fn get_event_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let event = state
        .gateway
        .find_event_by_slug(&slug)
        .await?
        .filter(|e| e.status == EventStatus::Published)
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
    Ok(success(event, "Event found").into_response())
}

#[derive(Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub starts_at: Option<DateTime<Utc>>,
}

pub async fn update_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(body): Json<UpdateEventRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;

    if let Some(title) = &body.title {
        if title.trim().is_empty() {
            return Err(AppError::ValidationError("title must not be empty".to_string()));
        }
    }

    let event = state
        .gateway
        .update_event(
            event_id,
            EventPatch {
                title: body.title,
                description: body.description.map(Some),
                location: body.location,
                status: body.status,
                starts_at: body.starts_at,
            },
        )
        .await?;
    Ok(success(event, "Event updated").into_response())
}

pub async fn delete_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    state.gateway.delete_event(event_id).await?;
    Ok(empty_success("Event deleted").into_response())
}

#[derive(Deserialize)]
pub struct CreateModalityRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub capacity: Option<i32>,
}

impl CreateModalityRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        if self.price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }
        if self.capacity.is_some_and(|c| c <= 0) {
            return Err(AppError::ValidationError(
                "capacity must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

pub async fn create_modality(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateModalityRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    body.validate()?;

    let modality = state
        .gateway
        .create_modality(NewModality {
            event_id,
            name: body.name.trim().to_string(),
            description: body.description,
            price: body.price,
            capacity: body.capacity,
        })
        .await?;
    Ok(created(modality, "Modality created").into_response())
}

pub async fn list_modalities(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let modalities = state.gateway.list_modalities(event_id).await?;
    Ok(success(modalities, "Modalities listed").into_response())
}

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    pub name: String,
    pub price: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub sales_limit: Option<i32>,
    #[serde(default)]
    pub sort_order: i32,
}

impl CreateBatchRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.price < Decimal::ZERO {
            return Err(AppError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }
        if self.ends_at.is_some_and(|e| e <= self.starts_at) {
            return Err(AppError::ValidationError(
                "ends_at must be after starts_at".to_string(),
            ));
        }
        if self.sales_limit.is_some_and(|l| l <= 0) {
            return Err(AppError::ValidationError(
                "sales_limit must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

pub async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateBatchRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    body.validate()?;

    let batch = state
        .gateway
        .create_batch(NewBatch {
            event_id,
            name: body.name.trim().to_string(),
            price: body.price,
            starts_at: body.starts_at,
            ends_at: body.ends_at,
            sales_limit: body.sales_limit,
            sort_order: body.sort_order,
        })
        .await?;
    Ok(created(batch, "Batch created").into_response())
}

pub async fn list_batches(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let batches = state.gateway.list_batches(event_id).await?;
    Ok(success(batches, "Batches listed").into_response())
}

#[derive(Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub max_uses: Option<i32>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateCouponRequest {
    fn validate(&self) -> Result<(), AppError> {
        let code = self.code.trim();
        if code.is_empty() || code.len() > 40 {
            return Err(AppError::ValidationError(
                "code must be 1 to 40 characters".to_string(),
            ));
        }
        if self.value <= Decimal::ZERO {
            return Err(AppError::ValidationError(
                "value must be positive".to_string(),
            ));
        }
        if self.kind == DiscountKind::Percentage && self.value > Decimal::from(100) {
            return Err(AppError::ValidationError(
                "percentage discount cannot exceed 100".to_string(),
            ));
        }
        if self.max_uses.is_some_and(|m| m <= 0) {
            return Err(AppError::ValidationError(
                "max_uses must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

pub async fn create_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateCouponRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    body.validate()?;

    let coupon = state
        .gateway
        .create_coupon(NewCoupon {
            event_id,
            code: body.code,
            kind: body.kind,
            value: body.value,
            max_uses: body.max_uses,
            starts_at: body.starts_at,
            expires_at: body.expires_at,
        })
        .await?;
    Ok(created(coupon, "Coupon created").into_response())
}

pub async fn list_coupons(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    let coupons = state.gateway.list_coupons(event_id).await?;
    Ok(success(coupons, "Coupons listed").into_response())
}

#[derive(Deserialize)]
pub struct CreateKitRequest {
    pub modality_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub includes_shirt: bool,
    #[serde(default)]
    pub shirt_sizes: Vec<ShirtStock>,
}

#[derive(Deserialize)]
pub struct ShirtStock {
    pub size: ShirtSize,
    pub stock: i32,
}

impl CreateKitRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        if self.includes_shirt && self.shirt_sizes.is_empty() {
            return Err(AppError::ValidationError(
                "shirt_sizes required when the kit includes a shirt".to_string(),
            ));
        }
        if !self.includes_shirt && !self.shirt_sizes.is_empty() {
            return Err(AppError::ValidationError(
                "shirt_sizes only allowed when the kit includes a shirt".to_string(),
            ));
        }
        if self.shirt_sizes.iter().any(|s| s.stock < 0) {
            return Err(AppError::ValidationError(
                "stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub async fn create_kit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(body): Json<CreateKitRequest>,
) -> Result<Response, AppError> {
    let claims = require_organizer(&state, &headers)?;
    owned_event(&state, event_id, claims.sub).await?;
    body.validate()?;

    let modalities = state.gateway.list_modalities(event_id).await?;
    if !modalities.iter().any(|m| m.id == body.modality_id) {
        return Err(AppError::NotFound("Modality not found".to_string()));
    }

    let kit = state
        .gateway
        .create_kit(NewKit {
            event_id,
            modality_id: body.modality_id,
            name: body.name.trim().to_string(),
            includes_shirt: body.includes_shirt,
            shirt_sizes: body
                .shirt_sizes
                .into_iter()
                .map(|s| (s.size, s.stock))
                .collect(),
        })
        .await?;
    Ok(created(kit, "Kit created").into_response())
}
