use axum::routing::{get, patch, post};
use axum::Router;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{auth, checkout, events, health_check, registrations, webhooks};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/refresh", post(auth::refresh))
        .route("/users", post(auth::create_user))
        .route("/participants", post(auth::create_participant))
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/slug/:slug", get(events::get_event_by_slug))
        .route(
            "/events/:id",
            patch(events::update_event).delete(events::delete_event),
        )
        .route(
            "/events/:id/modalities",
            post(events::create_modality).get(events::list_modalities),
        )
        .route(
            "/events/:id/batches",
            post(events::create_batch).get(events::list_batches),
        )
        .route(
            "/events/:id/coupons",
            post(events::create_coupon).get(events::list_coupons),
        )
        .route("/events/:id/kits", post(events::create_kit))
        .route("/checkout/quote", post(checkout::quote))
        .route("/checkout", post(checkout::checkout))
        .route("/registrations", get(registrations::list_own))
        .route("/registrations/expire-overdue", post(registrations::expire_overdue))
        .route("/registrations/:id", get(registrations::get_one))
        .route("/registrations/:id/payment", post(registrations::attach_payment))
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
