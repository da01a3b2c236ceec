// service/completion_service.rs
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::PricingConfig,
    db::{completiondb::CompletionExt, db::DBClient},
    models::{
        completionmodel::{Appointment, CompletionStatus, SoloOffer, WorkerCompletionRecord},
        usermodel::{User, UserRole},
    },
    service::{
        error::ServiceError,
        notification_service::NotificationService,
        payout_service::{PayoutOutcome, PayoutService},
        reassignment_service::ReassignmentService,
    },
};

/// When a submission left unanswered flips to auto-approved.
/// Homeowners who never respond must not block a cleaner's payment.
pub fn auto_approval_deadline(now: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(window_hours)
}

/// Presence check only. The checklist subsystem owns the shape of the
/// evidence; this core stores it opaquely.
pub fn evidence_present(evidence: Option<&JsonValue>) -> bool {
    match evidence {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(a)) => !a.is_empty(),
        Some(JsonValue::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

/// Submission is allowed once the service window has started, or once
/// the cleaner has been on site for the minimum duration.
pub fn timing_allows(
    now: DateTime<Utc>,
    scheduled_start: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
    min_on_site_minutes: i64,
) -> bool {
    if now >= scheduled_start {
        return true;
    }

    match checked_in_at {
        Some(checked_in) => now - checked_in >= Duration::minutes(min_on_site_minutes),
        None => false,
    }
}

#[derive(Debug, Serialize)]
pub struct ApprovalResult {
    pub record: WorkerCompletionRecord,
    pub payout: PayoutOutcome,
    pub appointment_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct ExitResult {
    pub record: WorkerCompletionRecord,
    pub solo_offer: Option<SoloOffer>,
}

#[derive(Debug, Clone)]
pub struct CompletionService {
    db_client: Arc<DBClient>,
    payout_service: Arc<PayoutService>,
    notification_service: Arc<NotificationService>,
    reassignment_service: Arc<ReassignmentService>,
    pricing: PricingConfig,
}

impl CompletionService {
    pub fn new(
        db_client: Arc<DBClient>,
        payout_service: Arc<PayoutService>,
        notification_service: Arc<NotificationService>,
        reassignment_service: Arc<ReassignmentService>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            db_client,
            payout_service,
            notification_service,
            reassignment_service,
            pricing,
        }
    }

    pub async fn check_in(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<WorkerCompletionRecord, ServiceError> {
        let _ = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        let record = self
            .db_client
            .get_worker_record(appointment_id, worker_id)
            .await?
            .ok_or(ServiceError::NotAssigned(worker_id, appointment_id))?;

        let updated = self
            .db_client
            .mark_checked_in(appointment_id, worker_id, Utc::now())
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "Cannot check in from status {}",
                    record.status.to_str()
                ))
            })?;

        self.db_client
            .record_completion_event(appointment_id, Some(worker_id), Some(worker_id), "worker_checked_in", None)
            .await?;

        Ok(updated)
    }

    pub async fn submit(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        evidence: Option<JsonValue>,
    ) -> Result<WorkerCompletionRecord, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        let record = self
            .db_client
            .get_worker_record(appointment_id, worker_id)
            .await?
            .ok_or(ServiceError::NotAssigned(worker_id, appointment_id))?;

        if record.status != CompletionStatus::InProgress {
            return Err(submit_conflict(&record, appointment_id, worker_id));
        }

        if !appointment.payment_captured {
            return Err(ServiceError::PaymentNotCaptured(appointment_id));
        }

        if self.pricing.requires_evidence && !evidence_present(evidence.as_ref()) {
            return Err(ServiceError::EvidenceRequired);
        }

        let now = Utc::now();
        if !timing_allows(
            now,
            appointment.scheduled_start,
            record.checked_in_at,
            self.pricing.min_on_site_minutes,
        ) {
            return Err(ServiceError::TimingNotAllowed);
        }

        let expires_at = auto_approval_deadline(now, self.pricing.auto_approval_hours);

        let updated = match self
            .db_client
            .mark_submitted(appointment_id, worker_id, evidence, expires_at)
            .await?
        {
            Some(updated) => updated,
            // Lost a race with a concurrent submit; re-read to report
            // the state we actually lost to.
            None => {
                let current = self
                    .db_client
                    .get_worker_record(appointment_id, worker_id)
                    .await?
                    .ok_or(ServiceError::NotAssigned(worker_id, appointment_id))?;
                return Err(submit_conflict(&current, appointment_id, worker_id));
            }
        };

        self.db_client
            .record_completion_event(
                appointment_id,
                Some(worker_id),
                Some(worker_id),
                "completion_submitted",
                Some(serde_json::json!({
                    "auto_approval_expires_at": updated.auto_approval_expires_at,
                })),
            )
            .await?;

        if let Err(e) = self
            .notification_service
            .notify_completion_submitted(appointment.homeowner_id, &appointment, worker_id)
            .await
        {
            tracing::warn!("Failed to notify homeowner of submission: {}", e);
        }

        Ok(updated)
    }

    pub async fn approve(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        approver_id: Uuid,
    ) -> Result<ApprovalResult, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        let record = self
            .approvable_record(&appointment, worker_id, approver_id)
            .await?;

        let updated = self
            .db_client
            .mark_approved(appointment_id, worker_id, CompletionStatus::Approved, Some(approver_id))
            .await?
            .ok_or(ServiceError::NotApprovable(record.status))?;

        self.finish_approval(&appointment, updated, false).await
    }

    /// Same transition and settlement as `approve`, but flags the
    /// appointment for follow-up. The cleaner is paid in full
    /// regardless of the concerns; review sentiment never blocks
    /// settlement.
    pub async fn request_review(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        approver_id: Uuid,
        concerns: String,
    ) -> Result<ApprovalResult, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        let record = self
            .approvable_record(&appointment, worker_id, approver_id)
            .await?;

        let updated = self
            .db_client
            .mark_approved(appointment_id, worker_id, CompletionStatus::Approved, Some(approver_id))
            .await?
            .ok_or(ServiceError::NotApprovable(record.status))?;

        self.db_client.set_feedback_required(appointment_id).await?;

        self.db_client
            .record_completion_event(
                appointment_id,
                Some(worker_id),
                Some(approver_id),
                "review_requested",
                Some(serde_json::json!({ "concerns": concerns })),
            )
            .await?;

        self.finish_approval(&appointment, updated, false).await
    }

    /// Sweep entry point: flip one expired submission. Returns None
    /// when the record was approved (or otherwise moved) before the
    /// sweep got to it.
    pub async fn auto_approve(
        &self,
        record: &WorkerCompletionRecord,
    ) -> Result<Option<ApprovalResult>, ServiceError> {
        let appointment = match self.db_client.get_appointment(record.appointment_id).await? {
            Some(appointment) => appointment,
            None => {
                tracing::warn!(
                    "Skipping auto-approval: appointment {} no longer loads",
                    record.appointment_id
                );
                return Ok(None);
            }
        };

        let updated = match self
            .db_client
            .mark_approved(
                record.appointment_id,
                record.worker_id,
                CompletionStatus::AutoApproved,
                None,
            )
            .await?
        {
            Some(updated) => updated,
            None => return Ok(None),
        };

        let result = self.finish_approval(&appointment, updated, true).await?;
        Ok(Some(result))
    }

    pub async fn mark_dropout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        actor: &User,
        reason: String,
    ) -> Result<ExitResult, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        // Cleaners report their own dropout; ops can do it for them.
        if actor.id != worker_id && actor.role != UserRole::Admin {
            return Err(ServiceError::Forbidden(actor.id, appointment_id));
        }

        self.exit_worker(&appointment, worker_id, actor.id, CompletionStatus::DroppedOut, Some(reason))
            .await
    }

    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        actor: &User,
    ) -> Result<ExitResult, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        // No-shows are reported by the homeowner (or ops).
        if actor.id != appointment.homeowner_id && actor.role != UserRole::Admin {
            return Err(ServiceError::Forbidden(actor.id, appointment_id));
        }

        self.exit_worker(&appointment, worker_id, actor.id, CompletionStatus::NoShow, None)
            .await
    }

    async fn exit_worker(
        &self,
        appointment: &Appointment,
        worker_id: Uuid,
        actor_id: Uuid,
        status: CompletionStatus,
        reason: Option<String>,
    ) -> Result<ExitResult, ServiceError> {
        let record = self
            .db_client
            .get_worker_record(appointment.id, worker_id)
            .await?
            .ok_or(ServiceError::NotAssigned(worker_id, appointment.id))?;

        if !record.status.can_transition_to(status) {
            return Err(ServiceError::InvalidTransition(record.status, status));
        }

        let updated = self
            .db_client
            .mark_exited(appointment.id, worker_id, status, reason)
            .await?
            .ok_or(ServiceError::InvalidTransition(record.status, status))?;

        let solo_offer = self
            .reassignment_service
            .handle_worker_exit(appointment, worker_id)
            .await?;

        // A departure never completes a job by itself, but the rollup
        // is cheap and keeps the aggregate honest.
        self.db_client
            .recompute_aggregate_completion(appointment.id)
            .await?;

        self.db_client
            .record_completion_event(
                appointment.id,
                Some(worker_id),
                Some(actor_id),
                status.to_str(),
                updated
                    .dropout_reason
                    .as_ref()
                    .map(|r| serde_json::json!({ "reason": r })),
            )
            .await?;

        Ok(ExitResult {
            record: updated,
            solo_offer,
        })
    }

    async fn approvable_record(
        &self,
        appointment: &Appointment,
        worker_id: Uuid,
        approver_id: Uuid,
    ) -> Result<WorkerCompletionRecord, ServiceError> {
        if appointment.homeowner_id != approver_id {
            return Err(ServiceError::Forbidden(approver_id, appointment.id));
        }

        let record = self
            .db_client
            .get_worker_record(appointment.id, worker_id)
            .await?
            .ok_or(ServiceError::NotAssigned(worker_id, appointment.id))?;

        match record.status {
            CompletionStatus::Submitted => Ok(record),
            CompletionStatus::Approved | CompletionStatus::AutoApproved => {
                Err(ServiceError::AlreadyApproved(appointment.id))
            }
            status => Err(ServiceError::NotApprovable(status)),
        }
    }

    async fn finish_approval(
        &self,
        appointment: &Appointment,
        record: WorkerCompletionRecord,
        auto: bool,
    ) -> Result<ApprovalResult, ServiceError> {
        let payout = self
            .payout_service
            .issue_payout(appointment.id, record.worker_id)
            .await?;

        let appointment_completed = self
            .db_client
            .recompute_aggregate_completion(appointment.id)
            .await?;

        if let Err(e) = self
            .notification_service
            .notify_completion_approved(record.worker_id, appointment, auto)
            .await
        {
            tracing::warn!("Failed to notify worker of approval: {}", e);
        }

        self.db_client
            .record_completion_event(
                appointment.id,
                Some(record.worker_id),
                record.approved_by,
                if auto { "completion_auto_approved" } else { "completion_approved" },
                None,
            )
            .await?;

        Ok(ApprovalResult {
            record,
            payout,
            appointment_completed,
        })
    }
}

fn submit_conflict(
    record: &WorkerCompletionRecord,
    appointment_id: Uuid,
    worker_id: Uuid,
) -> ServiceError {
    match record.status {
        CompletionStatus::Submitted => ServiceError::AlreadySubmitted(appointment_id),
        CompletionStatus::Approved | CompletionStatus::AutoApproved => {
            ServiceError::AlreadyApproved(appointment_id)
        }
        // A released slot is no longer an assignment.
        CompletionStatus::DroppedOut | CompletionStatus::NoShow => {
            ServiceError::NotAssigned(worker_id, appointment_id)
        }
        CompletionStatus::InProgress => {
            ServiceError::Conflict("Submission raced with another update".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_auto_approval_deadline() {
        let now = at(9, 0);
        assert_eq!(auto_approval_deadline(now, 48), now + Duration::hours(48));
        assert_eq!(auto_approval_deadline(now, 0), now);
    }

    #[test]
    fn test_evidence_present() {
        assert!(!evidence_present(None));
        assert!(!evidence_present(Some(&JsonValue::Null)));
        assert!(!evidence_present(Some(&serde_json::json!(""))));
        assert!(!evidence_present(Some(&serde_json::json!([]))));
        assert!(!evidence_present(Some(&serde_json::json!({}))));
        assert!(evidence_present(Some(&serde_json::json!({"rooms": ["kitchen"]}))));
        assert!(evidence_present(Some(&serde_json::json!(["photo-1"]))));
    }

    #[test]
    fn test_timing_after_window_start() {
        assert!(timing_allows(at(10, 0), at(9, 0), None, 30));
        assert!(timing_allows(at(9, 0), at(9, 0), None, 30));
    }

    #[test]
    fn test_submit_conflicts_map_to_specific_errors() {
        let appointment_id = Uuid::new_v4();
        let worker_id = Uuid::new_v4();
        let record = |status| WorkerCompletionRecord {
            id: Uuid::new_v4(),
            appointment_id,
            worker_id,
            status,
            checked_in_at: None,
            submitted_at: None,
            approved_at: None,
            approved_by: None,
            auto_approval_expires_at: None,
            checklist_evidence: None,
            dropout_reason: None,
            payout_id: None,
            created_at: None,
            updated_at: None,
        };

        assert!(matches!(
            submit_conflict(&record(CompletionStatus::Submitted), appointment_id, worker_id),
            ServiceError::AlreadySubmitted(_)
        ));
        assert!(matches!(
            submit_conflict(&record(CompletionStatus::Approved), appointment_id, worker_id),
            ServiceError::AlreadyApproved(_)
        ));
        assert!(matches!(
            submit_conflict(&record(CompletionStatus::AutoApproved), appointment_id, worker_id),
            ServiceError::AlreadyApproved(_)
        ));
        // A released slot no longer counts as an assignment.
        assert!(matches!(
            submit_conflict(&record(CompletionStatus::DroppedOut), appointment_id, worker_id),
            ServiceError::NotAssigned(_, _)
        ));
    }

    #[test]
    fn test_timing_before_window_requires_on_site_minimum() {
        // Early submit with no check-in: rejected.
        assert!(!timing_allows(at(8, 0), at(9, 0), None, 30));
        // Checked in 20 minutes ago: still short of the 30 minute floor.
        assert!(!timing_allows(at(8, 0), at(9, 0), Some(at(7, 40)), 30));
        // Checked in 45 minutes ago: allowed even before the window.
        assert!(timing_allows(at(8, 0), at(9, 0), Some(at(7, 15)), 30));
    }
}
