use std::sync::Arc;

use crate::auth::{TokenService, WebhookVerifier};
use crate::db::Gateway;
use crate::registration::RegistrationService;

/// Everything handlers need, constructed once at startup and injected
/// through the router. No component reaches for ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub registrations: Arc<RegistrationService>,
    pub tokens: Arc<TokenService>,
    pub webhooks: Arc<WebhookVerifier>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tokens: TokenService,
        webhooks: WebhookVerifier,
    ) -> Self {
        let registrations = Arc::new(RegistrationService::new(gateway.clone()));
        Self {
            gateway,
            registrations,
            tokens: Arc::new(tokens),
            webhooks: Arc::new(webhooks),
        }
    }
}
