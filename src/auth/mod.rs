pub mod token;
pub mod webhook;

pub use token::{Claims, PrincipalKind, TokenPair, TokenService, TokenUse};
pub use webhook::WebhookVerifier;
