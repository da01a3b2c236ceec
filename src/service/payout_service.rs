// service/payout_service.rs
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::PricingConfig,
    db::{completiondb::CompletionExt, db::DBClient, payoutdb::PayoutExt, userdb::UserExt},
    models::{
        completionmodel::Appointment,
        payoutmodel::{PayoutRecord, PayoutStatus},
    },
    service::{
        earnings,
        error::ServiceError,
        notification_service::NotificationService,
        payment_provider::PaymentProviderService,
    },
};

/// What a settlement attempt did, reported back through the approval
/// response so callers can tell the worker when money is delayed
/// instead of assuming it moved.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutOutcome {
    AlreadyPaid { payout_id: Uuid },
    Skipped { reason: String },
    Paid { payout: PayoutRecord },
    Failed { payout_id: Uuid, reason: String },
    /// Transfer outcome unknown (timed out in flight). The ledger row
    /// stays `processing` for the reconciliation sweep to resolve.
    Deferred { payout_id: Uuid, reason: String },
}

/// Local half of the at-most-once guard, separated out so it can be
/// reasoned about (and tested) without a database. The other half is
/// the idempotency reference the processor sees.
#[derive(Debug, PartialEq)]
pub enum PayoutDecision {
    AlreadyPaid { payout_id: Uuid },
    Skip { reason: String },
    Issue,
    Reissue { payout_id: Uuid },
}

pub fn payout_decision(
    existing: Option<&PayoutRecord>,
    destination: Option<&str>,
) -> PayoutDecision {
    if let Some(payout) = existing {
        if payout.status == PayoutStatus::Completed {
            return PayoutDecision::AlreadyPaid { payout_id: payout.id };
        }
    }

    if destination.is_none() {
        return PayoutDecision::Skip {
            reason: "No verified payout destination on file".to_string(),
        };
    }

    match existing {
        Some(payout) => PayoutDecision::Reissue { payout_id: payout.id },
        None => PayoutDecision::Issue,
    }
}

#[derive(Debug, Clone)]
pub struct PayoutService {
    db_client: Arc<DBClient>,
    payment_provider: Arc<PaymentProviderService>,
    notification_service: Arc<NotificationService>,
    pricing: PricingConfig,
}

impl PayoutService {
    pub fn new(
        db_client: Arc<DBClient>,
        payment_provider: Arc<PaymentProviderService>,
        notification_service: Arc<NotificationService>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            db_client,
            payment_provider,
            notification_service,
            pricing,
        }
    }

    /// Settle one worker's share of an approved appointment.
    ///
    /// At-most-once: a completed ledger row short-circuits before the
    /// processor is contacted, and every transfer request carries the
    /// payout id as idempotency reference, so a crash between "mark
    /// processing" and the confirmation cannot double-pay on retry.
    /// A failed transfer is recorded and returned; it is never
    /// silently retried here.
    pub async fn issue_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<PayoutOutcome, ServiceError> {
        let appointment = self
            .db_client
            .get_appointment(appointment_id)
            .await?
            .ok_or(ServiceError::AppointmentNotFound(appointment_id))?;

        let worker = self.db_client.get_user(worker_id).await?;
        let destination = worker
            .as_ref()
            .and_then(|w| w.payout_destination())
            .map(|d| d.to_string());

        let existing = self
            .db_client
            .get_active_payout(appointment_id, worker_id)
            .await?;

        let payout = match payout_decision(existing.as_ref(), destination.as_deref()) {
            PayoutDecision::AlreadyPaid { payout_id } => {
                return Ok(PayoutOutcome::AlreadyPaid { payout_id });
            }
            PayoutDecision::Skip { reason } => {
                let _ = self
                    .notification_service
                    .notify_payout_delayed(worker_id, appointment_id, &reason)
                    .await;
                return Ok(PayoutOutcome::Skipped { reason });
            }
            PayoutDecision::Issue => {
                let (gross, fee, net) = self.compute_share(&appointment, worker_id).await?;
                self.db_client
                    .create_payout(appointment_id, worker_id, gross, fee, net)
                    .await?
            }
            PayoutDecision::Reissue { payout_id } => {
                let (gross, fee, net) = self.compute_share(&appointment, worker_id).await?;
                self.db_client
                    .reissue_payout(payout_id, gross, fee, net)
                    .await?
            }
        };

        let destination = destination.expect("decision paths without a destination returned above");
        let reference = format!("po_{}", payout.id.simple());
        let metadata = serde_json::json!({
            "appointment_id": appointment_id,
            "worker_id": worker_id,
            "payout_id": payout.id,
        });

        match self
            .payment_provider
            .create_transfer(payout.net_amount, &destination, &reference, metadata)
            .await
        {
            Ok(initiation) => {
                let completed = self
                    .db_client
                    .complete_payout(payout.id, &initiation.transfer_id)
                    .await?;
                self.db_client
                    .link_payout(appointment_id, worker_id, completed.id)
                    .await?;

                if let Err(e) = self
                    .notification_service
                    .notify_payment_released(worker_id, appointment_id, completed.net_amount)
                    .await
                {
                    tracing::warn!("Failed to send payment notification: {}", e);
                }

                Ok(PayoutOutcome::Paid { payout: completed })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    "Transfer failed for payout {} (appointment {}, worker {}): {}",
                    payout.id,
                    appointment_id,
                    worker_id,
                    reason
                );

                let _ = self
                    .notification_service
                    .notify_payout_delayed(worker_id, appointment_id, &reason)
                    .await;

                // A timeout is ambiguous: the transfer may have landed
                // on the processor side. Leave the row processing so
                // reconciliation can query the transfer by reference;
                // a retried issue_payout reuses the same reference.
                let timed_out = e
                    .downcast_ref::<reqwest::Error>()
                    .map(|re| re.is_timeout())
                    .unwrap_or(false);
                if timed_out {
                    return Ok(PayoutOutcome::Deferred {
                        payout_id: payout.id,
                        reason,
                    });
                }

                self.db_client.fail_payout(payout.id, &reason).await?;

                Ok(PayoutOutcome::Failed {
                    payout_id: payout.id,
                    reason,
                })
            }
        }
    }

    /// Gross/fee/net for one worker, following the job shape: solo
    /// completion earnings after an accepted offer, effort-weighted
    /// shares when rooms are recorded, equal shares otherwise.
    async fn compute_share(
        &self,
        appointment: &Appointment,
        worker_id: Uuid,
    ) -> Result<(i64, i64, i64), ServiceError> {
        if appointment.solo_completion {
            let solo = earnings::solo_completion_earnings(
                appointment.price_cents,
                self.pricing.platform_fee_percent,
                self.pricing.solo_bonus_cents,
            );
            return Ok((solo.gross_cents, solo.platform_fee_cents, solo.net_cents));
        }

        if !appointment.is_multi_worker {
            let split =
                earnings::equal_split(appointment.price_cents, self.pricing.platform_fee_percent, 1);
            let share = &split.shares[0];
            return Ok((share.gross_cents, share.platform_fee_cents, share.net_cents));
        }

        let records = self
            .db_client
            .get_records_for_appointment(appointment.id)
            .await?;
        let active: Vec<Uuid> = records
            .iter()
            .filter(|r| r.status.is_active())
            .map(|r| r.worker_id)
            .collect();

        let index = active
            .iter()
            .position(|w| *w == worker_id)
            .ok_or(ServiceError::NotAssigned(worker_id, appointment.id))?;

        let rooms = self.db_client.get_room_assignments(appointment.id).await?;

        let split = if rooms.is_empty() {
            earnings::equal_split(
                appointment.price_cents,
                self.pricing.multi_worker_fee_percent,
                active.len(),
            )
        } else {
            let efforts: Vec<i64> = active
                .iter()
                .map(|w| {
                    rooms
                        .iter()
                        .filter(|room| room.worker_id == Some(*w))
                        .map(|room| room.estimated_effort_minutes as i64)
                        .sum()
                })
                .collect();
            earnings::proportional_split(
                appointment.price_cents,
                self.pricing.multi_worker_fee_percent,
                &efforts,
            )
        };

        let share = &split.shares[index];
        Ok((share.gross_cents, share.platform_fee_cents, share.net_cents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payout(status: PayoutStatus) -> PayoutRecord {
        PayoutRecord {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            worker_id: Uuid::new_v4(),
            gross_amount: 5000,
            platform_fee: 500,
            net_amount: 4500,
            status,
            transfer_id: None,
            failure_reason: None,
            captured_at: None,
            initiated_at: None,
            completed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_completed_payout_is_never_reissued() {
        let existing = payout(PayoutStatus::Completed);
        let decision = payout_decision(Some(&existing), Some("acct_123"));
        assert_eq!(decision, PayoutDecision::AlreadyPaid { payout_id: existing.id });

        // Even with no destination the completed row wins: the caller
        // gets already_paid without touching the processor.
        let decision = payout_decision(Some(&existing), None);
        assert_eq!(decision, PayoutDecision::AlreadyPaid { payout_id: existing.id });
    }

    #[test]
    fn test_missing_destination_skips() {
        let decision = payout_decision(None, None);
        assert!(matches!(decision, PayoutDecision::Skip { .. }));

        let existing = payout(PayoutStatus::Processing);
        let decision = payout_decision(Some(&existing), None);
        assert!(matches!(decision, PayoutDecision::Skip { .. }));
    }

    #[test]
    fn test_fresh_worker_issues_new_payout() {
        let decision = payout_decision(None, Some("acct_123"));
        assert_eq!(decision, PayoutDecision::Issue);
    }

    #[test]
    fn test_stuck_processing_row_is_reissued_with_same_id() {
        // A crash between "mark processing" and the confirmation leaves
        // a processing row; the retry reuses its id so the processor
        // sees the same idempotency reference.
        for status in [PayoutStatus::Pending, PayoutStatus::Held, PayoutStatus::Processing] {
            let existing = payout(status);
            let decision = payout_decision(Some(&existing), Some("acct_123"));
            assert_eq!(decision, PayoutDecision::Reissue { payout_id: existing.id });
        }
    }
}
