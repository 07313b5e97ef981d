use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

/// The two principal kinds known to the API. Organizers manage events;
/// participants register for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Organizer,
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub token_use: TokenUse,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: u64,
}

/// Issues and verifies the API's own HS256 tokens: a short-lived access
/// token and a longer-lived refresh token per principal.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, principal_id: Uuid, kind: PrincipalKind) -> Result<TokenPair, AppError> {
        let access = self.encode(principal_id, kind, TokenUse::Access, self.access_ttl)?;
        let refresh = self.encode(principal_id, kind, TokenUse::Refresh, self.refresh_ttl)?;
        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.access_ttl.as_secs(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, TokenUse::Access)
    }

    /// Verifies a refresh token; callers then `issue` a fresh pair.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, TokenUse::Refresh)
    }

    fn encode(
        &self,
        principal_id: Uuid,
        kind: PrincipalKind,
        token_use: TokenUse,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal_id,
            kind,
            token_use,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("token encoding failed: {e}")))
    }

    fn verify(&self, token: &str, expected_use: TokenUse) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::AuthError("Token expired".to_string()),
                _ => AppError::AuthError("Invalid token".to_string()),
            }
        })?;

        // A refresh token must never pass as an access token or vice versa.
        if data.claims.token_use != expected_use {
            return Err(AppError::AuthError("Wrong token type".to_string()));
        }

        Ok(data.claims)
    }
}
