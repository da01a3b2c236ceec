use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::completionmodel::{Appointment, CompletionStatus, WorkerCompletionRecord};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SubmitCompletionDto {
    /// Opaque checklist payload; only presence is validated here, the
    /// checklist subsystem owns its shape.
    pub checklist_evidence: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RequestReviewDto {
    #[validate(length(min = 5, max = 2000, message = "Concerns must be between 5 and 2000 characters"))]
    pub concerns: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DropoutDto {
    #[validate(length(min = 3, max = 500, message = "Reason must be between 3 and 500 characters"))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQueryDto {
    pub worker_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct WorkerStatusDto {
    pub worker_id: Uuid,
    pub status: CompletionStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub auto_approval_expires_at: Option<DateTime<Utc>>,
    pub seconds_until_auto_approval: Option<i64>,
    pub can_approve: bool,
    pub payout_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CompletionStatusDto {
    pub appointment_id: Uuid,
    pub completion_status: CompletionStatus,
    pub completed: bool,
    pub is_multi_worker: bool,
    pub solo_completion: bool,
    pub feedback_required: bool,
    pub confirmed_worker_count: i32,
    pub workers: Vec<WorkerStatusDto>,
}

impl WorkerStatusDto {
    pub fn from_record(record: &WorkerCompletionRecord, caller_is_homeowner: bool, now: DateTime<Utc>) -> Self {
        let submitted = record.status == CompletionStatus::Submitted;
        let seconds_until_auto_approval = if submitted {
            record
                .auto_approval_expires_at
                .map(|expires| (expires - now).num_seconds().max(0))
        } else {
            None
        };

        WorkerStatusDto {
            worker_id: record.worker_id,
            status: record.status,
            checked_in_at: record.checked_in_at,
            submitted_at: record.submitted_at,
            approved_at: record.approved_at,
            approved_by: record.approved_by,
            auto_approval_expires_at: record.auto_approval_expires_at,
            seconds_until_auto_approval,
            can_approve: caller_is_homeowner && submitted,
            payout_id: record.payout_id,
        }
    }
}

impl CompletionStatusDto {
    pub fn build(
        appointment: &Appointment,
        records: &[WorkerCompletionRecord],
        caller_is_homeowner: bool,
        now: DateTime<Utc>,
    ) -> Self {
        CompletionStatusDto {
            appointment_id: appointment.id,
            completion_status: appointment.completion_status,
            completed: appointment.completed,
            is_multi_worker: appointment.is_multi_worker,
            solo_completion: appointment.solo_completion,
            feedback_required: appointment.feedback_required,
            confirmed_worker_count: appointment.confirmed_worker_count,
            workers: records
                .iter()
                .map(|record| WorkerStatusDto::from_record(record, caller_is_homeowner, now))
                .collect(),
        }
    }
}

//Response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}
