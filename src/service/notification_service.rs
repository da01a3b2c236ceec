// service/notification_service.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::db::DBClient,
    models::completionmodel::Appointment,
    service::error::ServiceError,
    utils::currency::format_cents,
};

/// Fire-and-forget event sink. Real push/email/SMS delivery lives
/// behind the notifications table; callers must never let a failure
/// here roll back a business transition.
#[derive(Debug, Clone)]
pub struct NotificationService {
    db_client: Arc<DBClient>,
}

impl NotificationService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn notify_completion_submitted(
        &self,
        homeowner_id: Uuid,
        appointment: &Appointment,
        worker_id: Uuid,
    ) -> Result<(), ServiceError> {
        tracing::info!(
            "Completion submitted notification: worker {} on appointment {}",
            worker_id,
            appointment.id
        );

        self.store_notification(
            homeowner_id,
            "completion_submitted".to_string(),
            Some(appointment.id),
            Some(serde_json::json!({
                "worker_id": worker_id,
                "is_multi_worker": appointment.is_multi_worker,
            })),
            "Your cleaner has finished and submitted the job for your approval".to_string(),
        )
        .await
    }

    pub async fn notify_completion_approved(
        &self,
        worker_id: Uuid,
        appointment: &Appointment,
        auto: bool,
    ) -> Result<(), ServiceError> {
        let message = if auto {
            "Your completed job was automatically approved".to_string()
        } else {
            "The homeowner approved your completed job".to_string()
        };

        self.store_notification(
            worker_id,
            if auto { "completion_auto_approved" } else { "completion_approved" }.to_string(),
            Some(appointment.id),
            None,
            message,
        )
        .await
    }

    pub async fn notify_payment_released(
        &self,
        worker_id: Uuid,
        appointment_id: Uuid,
        amount_cents: i64,
    ) -> Result<(), ServiceError> {
        self.store_notification(
            worker_id,
            "payment_released".to_string(),
            Some(appointment_id),
            Some(serde_json::json!({ "amount_cents": amount_cents })),
            format!("Payment of {} is on its way", format_cents(amount_cents)),
        )
        .await
    }

    pub async fn notify_payout_delayed(
        &self,
        worker_id: Uuid,
        appointment_id: Uuid,
        reason: &str,
    ) -> Result<(), ServiceError> {
        tracing::warn!(
            "Payout delayed for worker {} on appointment {}: {}",
            worker_id,
            appointment_id,
            reason
        );

        self.store_notification(
            worker_id,
            "payout_delayed".to_string(),
            Some(appointment_id),
            Some(serde_json::json!({ "reason": reason })),
            "Your payment is delayed; our team is on it".to_string(),
        )
        .await
    }

    pub async fn notify_solo_offer(
        &self,
        worker_id: Uuid,
        appointment: &Appointment,
        projected_net_cents: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.store_notification(
            worker_id,
            "solo_completion_offer".to_string(),
            Some(appointment.id),
            Some(serde_json::json!({
                "projected_net_cents": projected_net_cents,
                "expires_at": expires_at,
            })),
            format!(
                "Your co-cleaner left the job. Finish it solo and earn {}",
                format_cents(projected_net_cents)
            ),
        )
        .await
    }

    async fn store_notification(
        &self,
        user_id: Uuid,
        event_type: String,
        appointment_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
        message: String,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, event_type, appointment_id, metadata, message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(appointment_id)
        .bind(metadata)
        .bind(message)
        .execute(&self.db_client.pool)
        .await?;

        Ok(())
    }
}
