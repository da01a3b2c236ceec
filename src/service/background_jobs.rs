// service/background_jobs.rs
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::{db::completiondb::CompletionExt, AppState};

const SWEEP_BATCH_SIZE: i64 = 100;

/// Background sweep that flips expired submissions to auto-approved,
/// with the same payout and rollup side effects as a manual approval.
pub async fn start_auto_approval_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(300));

    loop {
        interval.tick().await;

        let now = Utc::now();
        let expired = match app_state
            .db_client
            .get_expired_submissions(now, SWEEP_BATCH_SIZE)
            .await
        {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!("Auto-approval sweep failed to load candidates: {}", e);
                continue;
            }
        };

        if expired.is_empty() {
            continue;
        }

        tracing::info!("Auto-approval sweep: {} expired submission(s)", expired.len());

        let mut approved = 0usize;
        for record in &expired {
            match app_state.completion_service.auto_approve(record).await {
                Ok(Some(_)) => approved += 1,
                // Approved (or otherwise moved) before the sweep got
                // to it; nothing to do.
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        "Auto-approval failed for appointment {} worker {}: {}",
                        record.appointment_id,
                        record.worker_id,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Auto-approval sweep completed: {}/{} auto-approved",
            approved,
            expired.len()
        );
    }
}
