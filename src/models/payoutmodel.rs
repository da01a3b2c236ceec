use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Held,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn to_str(&self) -> &str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Held => "held",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }
}

/// Ledger row for one cleaner's share of one appointment.
///
/// `gross_amount = platform_fee + net_amount` always, and at most one
/// row per (appointment_id, worker_id) may reach `completed` — backed
/// by a partial unique index that ignores failed rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayoutRecord {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub worker_id: Uuid,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub status: PayoutStatus,
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
    pub updated_at: Option<DateTime<Utc>>, // Database has DEFAULT NOW(), can be NULL
}
