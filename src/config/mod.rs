use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACCESS_TTL_SECS: u64 = 900;
const DEFAULT_REFRESH_TTL_SECS: u64 = 60 * 60 * 24 * 14;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub webhook_secret: SecretString,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingRequired("DATABASE_URL"))?;
        if !database_url.starts_with("postgres://") && !database_url.starts_with("postgresql://") {
            return Err(ConfigError::Invalid(
                "DATABASE_URL",
                "expected a postgres:// URL".to_string(),
            ));
        }

        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 || max_connections > 100 {
            return Err(ConfigError::Invalid(
                "DATABASE_MAX_CONNECTIONS",
                format!("{max_connections} outside 1..=100"),
            ));
        }

        let port = parse_var("PORT", DEFAULT_PORT)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired("JWT_SECRET"))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid(
                "JWT_SECRET",
                "must be at least 32 bytes".to_string(),
            ));
        }

        let webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingRequired("PAYMENT_WEBHOOK_SECRET"))?;

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            jwt_secret: SecretString::new(jwt_secret),
            access_ttl: Duration::from_secs(parse_var(
                "ACCESS_TOKEN_TTL_SECS",
                DEFAULT_ACCESS_TTL_SECS,
            )?),
            refresh_ttl: Duration::from_secs(parse_var(
                "REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TTL_SECS,
            )?),
            webhook_secret: SecretString::new(webhook_secret),
        })
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_to_default() {
        std::env::remove_var("STARTLINE_TEST_UNSET");
        let v: u16 = parse_var("STARTLINE_TEST_UNSET", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        std::env::set_var("STARTLINE_TEST_GARBAGE", "not-a-number");
        let v: Result<u16, _> = parse_var("STARTLINE_TEST_GARBAGE", 0);
        assert!(v.is_err());
        std::env::remove_var("STARTLINE_TEST_GARBAGE");
    }
}
