use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Published,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    /// URL-safe, unique across all events.
    pub slug: String,
    pub description: Option<String>,
    pub location: String,
    pub status: EventStatus,
    pub starts_at: DateTime<Utc>,
    /// Next value of the per-event human-readable registration sequence.
    #[serde(skip_serializing)]
    pub next_registration_number: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_open_for_registration(&self) -> bool {
        self.status == EventStatus::Published
    }
}

/// Slug constraint shared by create/update validation: lowercase ASCII
/// alphanumerics and hyphens, no leading/trailing hyphen.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 80
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_slugs() {
        assert!(is_valid_slug("city-marathon-2026"));
        assert!(is_valid_slug("10k"));
    }

    #[test]
    fn rejects_malformed_slugs() {
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("UpperCase"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug(&"x".repeat(81)));
    }
}
