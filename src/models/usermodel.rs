use chrono::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Homeowner,
    Cleaner,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Homeowner => "homeowner",
            UserRole::Cleaner => "cleaner",
        }
    }
}

/// Accounts are owned elsewhere; this core only reads identity, role
/// and the payout destination state.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: uuid::Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub payout_recipient_code: Option<String>,
    pub payout_verified: bool,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}

impl User {
    /// Transfer destination usable by the payout issuer, present only
    /// once the cleaner's destination has been verified.
    pub fn payout_destination(&self) -> Option<&str> {
        if self.payout_verified {
            self.payout_recipient_code.as_deref()
        } else {
            None
        }
    }
}
