// db/completiondb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::completionmodel::*;

const RECORD_COLUMNS: &str = r#"
    id, appointment_id, worker_id, status, checked_in_at, submitted_at,
    approved_at, approved_by, auto_approval_expires_at, checklist_evidence,
    dropout_reason, payout_id, created_at, updated_at
"#;

const APPOINTMENT_COLUMNS: &str = r#"
    id, homeowner_id, home_id, price_cents, is_multi_worker, scheduled_start,
    completion_status, completed, payment_captured, feedback_required,
    confirmed_worker_count, solo_completion, created_at, updated_at
"#;

#[async_trait]
pub trait CompletionExt {
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, Error>;

    async fn get_worker_record(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<WorkerCompletionRecord>, Error>;

    async fn get_records_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<WorkerCompletionRecord>, Error>;

    async fn get_room_assignments(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<RoomAssignment>, Error>;

    async fn create_completion_records(
        &self,
        appointment_id: Uuid,
        worker_ids: &[Uuid],
    ) -> Result<Vec<WorkerCompletionRecord>, Error>;

    async fn mark_checked_in(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkerCompletionRecord>, Error>;

    /// Guarded submit: only flips a record that is still `in_progress`.
    /// Returns None when the guard loses, so the caller can map the
    /// current state to the right conflict error.
    async fn mark_submitted(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        evidence: Option<JsonValue>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<WorkerCompletionRecord>, Error>;

    /// Guarded approval (manual or automatic): only flips `submitted`.
    async fn mark_approved(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        status: CompletionStatus,
        approved_by: Option<Uuid>,
    ) -> Result<Option<WorkerCompletionRecord>, Error>;

    /// Guarded dropout/no-show: legal from `in_progress` or `submitted`.
    async fn mark_exited(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        status: CompletionStatus,
        reason: Option<String>,
    ) -> Result<Option<WorkerCompletionRecord>, Error>;

    async fn link_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        payout_id: Uuid,
    ) -> Result<(), Error>;

    async fn get_expired_submissions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WorkerCompletionRecord>, Error>;

    async fn release_room_assignments(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<u64, Error>;

    async fn claim_room_assignments(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<u64, Error>;

    async fn decrement_confirmed_workers(&self, appointment_id: Uuid) -> Result<(), Error>;

    async fn set_feedback_required(&self, appointment_id: Uuid) -> Result<(), Error>;

    async fn set_solo_completion(&self, appointment_id: Uuid) -> Result<(), Error>;

    /// Re-derives the appointment's completed flag from its worker
    /// records and room assignments, under a row lock on the
    /// appointment. Monotonic: never reverts a completed appointment.
    /// Returns the (possibly updated) completed flag.
    async fn recompute_aggregate_completion(&self, appointment_id: Uuid) -> Result<bool, Error>;

    async fn create_solo_offer(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        projected_net_cents: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<SoloOffer, Error>;

    async fn get_solo_offer(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<SoloOffer>, Error>;

    /// Guarded acceptance: only an unexpired, unaccepted offer.
    async fn accept_solo_offer(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SoloOffer>, Error>;

    async fn record_completion_event(
        &self,
        appointment_id: Uuid,
        worker_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        event: &str,
        detail: Option<JsonValue>,
    ) -> Result<(), Error>;
}

#[async_trait]
impl CompletionExt for DBClient {
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, Error> {
        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(appointment)
    }

    async fn get_worker_record(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<WorkerCompletionRecord>, Error> {
        let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            "SELECT {} FROM worker_completion_records WHERE appointment_id = $1 AND worker_id = $2",
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_records_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<WorkerCompletionRecord>, Error> {
        let records = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            "SELECT {} FROM worker_completion_records WHERE appointment_id = $1 ORDER BY created_at ASC",
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn get_room_assignments(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<RoomAssignment>, Error> {
        let rooms = sqlx::query_as::<_, RoomAssignment>(
            r#"
            SELECT id, appointment_id, worker_id, room_label,
                   estimated_effort_minutes, status, created_at
            FROM room_assignments
            WHERE appointment_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    async fn create_completion_records(
        &self,
        appointment_id: Uuid,
        worker_ids: &[Uuid],
    ) -> Result<Vec<WorkerCompletionRecord>, Error> {
        let mut records = Vec::with_capacity(worker_ids.len());

        for worker_id in worker_ids {
            let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
                r#"
                INSERT INTO worker_completion_records (appointment_id, worker_id, status)
                VALUES ($1, $2, 'in_progress'::completion_status)
                RETURNING {}
                "#,
                RECORD_COLUMNS
            ))
            .bind(appointment_id)
            .bind(worker_id)
            .fetch_one(&self.pool)
            .await?;

            records.push(record);
        }

        Ok(records)
    }

    async fn mark_checked_in(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkerCompletionRecord>, Error> {
        let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            r#"
            UPDATE worker_completion_records
            SET checked_in_at = COALESCE(checked_in_at, $3), updated_at = NOW()
            WHERE appointment_id = $1 AND worker_id = $2
              AND status = 'in_progress'::completion_status
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_submitted(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        evidence: Option<JsonValue>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<WorkerCompletionRecord>, Error> {
        let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            r#"
            UPDATE worker_completion_records
            SET status = 'submitted'::completion_status,
                submitted_at = NOW(),
                auto_approval_expires_at = $3,
                checklist_evidence = $4,
                updated_at = NOW()
            WHERE appointment_id = $1 AND worker_id = $2
              AND status = 'in_progress'::completion_status
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .bind(expires_at)
        .bind(evidence)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_approved(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        status: CompletionStatus,
        approved_by: Option<Uuid>,
    ) -> Result<Option<WorkerCompletionRecord>, Error> {
        let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            r#"
            UPDATE worker_completion_records
            SET status = $3,
                approved_at = NOW(),
                approved_by = $4,
                updated_at = NOW()
            WHERE appointment_id = $1 AND worker_id = $2
              AND status = 'submitted'::completion_status
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .bind(status)
        .bind(approved_by)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_exited(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        status: CompletionStatus,
        reason: Option<String>,
    ) -> Result<Option<WorkerCompletionRecord>, Error> {
        let record = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            r#"
            UPDATE worker_completion_records
            SET status = $3,
                dropout_reason = $4,
                updated_at = NOW()
            WHERE appointment_id = $1 AND worker_id = $2
              AND status IN ('in_progress'::completion_status, 'submitted'::completion_status)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .bind(status)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn link_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        payout_id: Uuid,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE worker_completion_records
            SET payout_id = $3, updated_at = NOW()
            WHERE appointment_id = $1 AND worker_id = $2
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .bind(payout_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_expired_submissions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WorkerCompletionRecord>, Error> {
        let records = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            r#"
            SELECT {}
            FROM worker_completion_records
            WHERE status = 'submitted'::completion_status
              AND auto_approval_expires_at IS NOT NULL
              AND auto_approval_expires_at <= $1
            ORDER BY auto_approval_expires_at ASC
            LIMIT $2
            "#,
            RECORD_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn release_room_assignments(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE room_assignments
            SET worker_id = NULL, status = 'pending'::room_status
            WHERE appointment_id = $1 AND worker_id = $2
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn claim_room_assignments(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE room_assignments
            SET worker_id = $2, status = 'claimed'::room_status
            WHERE appointment_id = $1 AND worker_id IS NULL
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn decrement_confirmed_workers(&self, appointment_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE appointments
            SET confirmed_worker_count = GREATEST(confirmed_worker_count - 1, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(appointment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_feedback_required(&self, appointment_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            "UPDATE appointments SET feedback_required = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(appointment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_solo_completion(&self, appointment_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            "UPDATE appointments SET solo_completion = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(appointment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recompute_aggregate_completion(&self, appointment_id: Uuid) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;

        // The appointment row is the serialization point for the
        // rollup; worker-level transitions themselves never contend.
        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {} FROM appointments WHERE id = $1 FOR UPDATE",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let appointment = match appointment {
            Some(appointment) => appointment,
            None => return Ok(false),
        };

        if appointment.completed {
            tx.commit().await?;
            return Ok(true);
        }

        let records = sqlx::query_as::<_, WorkerCompletionRecord>(&format!(
            "SELECT {} FROM worker_completion_records WHERE appointment_id = $1 ORDER BY created_at ASC",
            RECORD_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_all(&mut *tx)
        .await?;

        let rooms = sqlx::query_as::<_, RoomAssignment>(
            r#"
            SELECT id, appointment_id, worker_id, room_label,
                   estimated_effort_minutes, status, created_at
            FROM room_assignments
            WHERE appointment_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(appointment_id)
        .fetch_all(&mut *tx)
        .await?;

        let settled = JobCompletion::from_parts(appointment.is_multi_worker, records, rooms)
            .map(|completion| completion.is_settled())
            .unwrap_or(false);

        if settled {
            sqlx::query(
                r#"
                UPDATE appointments
                SET completed = TRUE,
                    completion_status = 'approved'::completion_status,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(appointment_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(settled)
    }

    async fn create_solo_offer(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        projected_net_cents: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<SoloOffer, Error> {
        let offer = sqlx::query_as::<_, SoloOffer>(
            r#"
            INSERT INTO solo_offers (appointment_id, worker_id, projected_net_cents, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, appointment_id, worker_id, projected_net_cents,
                      expires_at, accepted_at, created_at
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .bind(projected_net_cents)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(offer)
    }

    async fn get_solo_offer(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<SoloOffer>, Error> {
        let offer = sqlx::query_as::<_, SoloOffer>(
            r#"
            SELECT id, appointment_id, worker_id, projected_net_cents,
                   expires_at, accepted_at, created_at
            FROM solo_offers
            WHERE appointment_id = $1 AND worker_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offer)
    }

    async fn accept_solo_offer(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SoloOffer>, Error> {
        let offer = sqlx::query_as::<_, SoloOffer>(
            r#"
            UPDATE solo_offers
            SET accepted_at = $2
            WHERE id = $1 AND accepted_at IS NULL AND expires_at > $2
            RETURNING id, appointment_id, worker_id, projected_net_cents,
                      expires_at, accepted_at, created_at
            "#,
        )
        .bind(offer_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(offer)
    }

    async fn record_completion_event(
        &self,
        appointment_id: Uuid,
        worker_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        event: &str,
        detail: Option<JsonValue>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO completion_events (appointment_id, worker_id, actor_id, event, detail)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(appointment_id)
        .bind(worker_id)
        .bind(actor_id)
        .bind(event)
        .bind(detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
