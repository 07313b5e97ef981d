use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "shirt_size", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ShirtSize {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
}

impl ShirtSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShirtSize::Xs => "XS",
            ShirtSize::S => "S",
            ShirtSize::M => "M",
            ShirtSize::L => "L",
            ShirtSize::Xl => "XL",
            ShirtSize::Xxl => "XXL",
        }
    }
}

/// The goodie bag handed to a confirmed participant. A kit belongs to one
/// modality; when it includes a shirt, stock is tracked per size.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Kit {
    pub id: Uuid,
    pub event_id: Uuid,
    pub modality_id: Uuid,
    pub name: String,
    pub includes_shirt: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KitShirtSize {
    pub id: Uuid,
    pub kit_id: Uuid,
    pub size: ShirtSize,
    /// Never negative; decremented only when a registration confirms.
    pub stock: i32,
}
