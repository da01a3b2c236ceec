// service/reassignment_service.rs
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::PricingConfig,
    db::{completiondb::CompletionExt, db::DBClient},
    models::completionmodel::{Appointment, SoloOffer},
    service::{earnings, error::ServiceError, notification_service::NotificationService},
};

/// Handles the fallout of a cleaner leaving a job: released room
/// slots, the confirmed-worker count, and the time-boxed solo
/// completion offer when a single cleaner is left holding a
/// multi-cleaner booking.
#[derive(Debug, Clone)]
pub struct ReassignmentService {
    db_client: Arc<DBClient>,
    notification_service: Arc<NotificationService>,
    pricing: PricingConfig,
}

impl ReassignmentService {
    pub fn new(
        db_client: Arc<DBClient>,
        notification_service: Arc<NotificationService>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            db_client,
            notification_service,
            pricing,
        }
    }

    /// Called after a dropout/no-show transition has landed. Returns
    /// the solo offer if one was extended.
    pub async fn handle_worker_exit(
        &self,
        appointment: &Appointment,
        departing_worker: Uuid,
    ) -> Result<Option<SoloOffer>, ServiceError> {
        let released = self
            .db_client
            .release_room_assignments(appointment.id, departing_worker)
            .await?;
        if released > 0 {
            tracing::info!(
                "Released {} room(s) from worker {} on appointment {}",
                released,
                departing_worker,
                appointment.id
            );
        }

        self.db_client
            .decrement_confirmed_workers(appointment.id)
            .await?;

        if !appointment.is_multi_worker {
            return Ok(None);
        }

        // Only cleaners with still-open work are candidates; someone
        // already approved has nothing left to absorb the job with.
        let records = self
            .db_client
            .get_records_for_appointment(appointment.id)
            .await?;
        let eligible: Vec<Uuid> = records
            .iter()
            .filter(|r| r.worker_id != departing_worker && !r.status.is_terminal())
            .map(|r| r.worker_id)
            .collect();

        if eligible.len() != 1 {
            return Ok(None);
        }

        let remaining_worker = eligible[0];
        let solo = earnings::solo_completion_earnings(
            appointment.price_cents,
            self.pricing.platform_fee_percent,
            self.pricing.solo_bonus_cents,
        );
        let expires_at = Utc::now() + Duration::hours(self.pricing.solo_offer_hours);

        let offer = self
            .db_client
            .create_solo_offer(appointment.id, remaining_worker, solo.net_cents, expires_at)
            .await?;

        if let Err(e) = self
            .notification_service
            .notify_solo_offer(remaining_worker, appointment, solo.net_cents, expires_at)
            .await
        {
            tracing::warn!("Failed to notify worker of solo offer: {}", e);
        }

        self.db_client
            .record_completion_event(
                appointment.id,
                Some(remaining_worker),
                None,
                "solo_offer_extended",
                Some(serde_json::json!({
                    "projected_net_cents": solo.net_cents,
                    "expires_at": expires_at,
                })),
            )
            .await?;

        Ok(Some(offer))
    }

    /// The offer is explicit: nothing converts to solo completion
    /// until the cleaner accepts, and only within the offer window.
    pub async fn accept_solo_offer(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<SoloOffer, ServiceError> {
        let offer = self
            .db_client
            .get_solo_offer(appointment_id, worker_id)
            .await?
            .ok_or(ServiceError::OfferNotFound(worker_id, appointment_id))?;

        let now = Utc::now();
        let accepted = match self.db_client.accept_solo_offer(offer.id, now).await? {
            Some(accepted) => accepted,
            None => {
                if offer.accepted_at.is_some() {
                    return Err(ServiceError::Conflict(
                        "Solo completion offer was already accepted".to_string(),
                    ));
                }
                return Err(ServiceError::OfferExpired);
            }
        };

        let claimed = self
            .db_client
            .claim_room_assignments(appointment_id, worker_id)
            .await?;
        self.db_client.set_solo_completion(appointment_id).await?;

        self.db_client
            .record_completion_event(
                appointment_id,
                Some(worker_id),
                Some(worker_id),
                "solo_offer_accepted",
                Some(serde_json::json!({ "rooms_claimed": claimed })),
            )
            .await?;

        Ok(accepted)
    }
}
