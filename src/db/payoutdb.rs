// db/payoutdb.rs
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::payoutmodel::PayoutRecord;

const PAYOUT_COLUMNS: &str = r#"
    id, appointment_id, worker_id, gross_amount, platform_fee, net_amount,
    status, transfer_id, failure_reason, captured_at, initiated_at,
    completed_at, created_at, updated_at
"#;

#[async_trait]
pub trait PayoutExt {
    /// The one non-failed ledger row for this (appointment, worker),
    /// if any. Failed attempts fall out of the unique constraint and
    /// out of this lookup.
    async fn get_active_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<PayoutRecord>, Error>;

    async fn get_payouts_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<PayoutRecord>, Error>;

    async fn create_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        gross_amount: i64,
        platform_fee: i64,
        net_amount: i64,
    ) -> Result<PayoutRecord, Error>;

    /// Re-arms an existing pending/held/processing row for a fresh
    /// transfer attempt, refreshing the amounts.
    async fn reissue_payout(
        &self,
        payout_id: Uuid,
        gross_amount: i64,
        platform_fee: i64,
        net_amount: i64,
    ) -> Result<PayoutRecord, Error>;

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        transfer_id: &str,
    ) -> Result<PayoutRecord, Error>;

    async fn fail_payout(&self, payout_id: Uuid, reason: &str) -> Result<PayoutRecord, Error>;
}

#[async_trait]
impl PayoutExt for DBClient {
    async fn get_active_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<PayoutRecord>, Error> {
        let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
            r#"
            SELECT {}
            FROM payout_records
            WHERE appointment_id = $1 AND worker_id = $2
              AND status != 'failed'::payout_status
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn get_payouts_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<PayoutRecord>, Error> {
        let payouts = sqlx::query_as::<_, PayoutRecord>(&format!(
            "SELECT {} FROM payout_records WHERE appointment_id = $1 ORDER BY created_at ASC",
            PAYOUT_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    async fn create_payout(
        &self,
        appointment_id: Uuid,
        worker_id: Uuid,
        gross_amount: i64,
        platform_fee: i64,
        net_amount: i64,
    ) -> Result<PayoutRecord, Error> {
        let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
            r#"
            INSERT INTO payout_records
                (appointment_id, worker_id, gross_amount, platform_fee, net_amount,
                 status, captured_at, initiated_at)
            VALUES ($1, $2, $3, $4, $5, 'processing'::payout_status, NOW(), NOW())
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(appointment_id)
        .bind(worker_id)
        .bind(gross_amount)
        .bind(platform_fee)
        .bind(net_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn reissue_payout(
        &self,
        payout_id: Uuid,
        gross_amount: i64,
        platform_fee: i64,
        net_amount: i64,
    ) -> Result<PayoutRecord, Error> {
        let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
            r#"
            UPDATE payout_records
            SET gross_amount = $2,
                platform_fee = $3,
                net_amount = $4,
                status = 'processing'::payout_status,
                failure_reason = NULL,
                initiated_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status != 'completed'::payout_status
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .bind(gross_amount)
        .bind(platform_fee)
        .bind(net_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn complete_payout(
        &self,
        payout_id: Uuid,
        transfer_id: &str,
    ) -> Result<PayoutRecord, Error> {
        let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
            r#"
            UPDATE payout_records
            SET status = 'completed'::payout_status,
                transfer_id = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .bind(transfer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn fail_payout(&self, payout_id: Uuid, reason: &str) -> Result<PayoutRecord, Error> {
        let payout = sqlx::query_as::<_, PayoutRecord>(&format!(
            r#"
            UPDATE payout_records
            SET status = 'failed'::payout_status,
                failure_reason = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(payout)
    }
}
