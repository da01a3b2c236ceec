// service/payment_provider.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferInitiation {
    pub transfer_id: String,
    pub reference: String,
    pub status: String,
}

/// Thin client for the external payment processor's transfer API.
///
/// The processor honors the reference as an idempotency key: replaying
/// a transfer with the same reference returns the original transfer
/// instead of moving money twice. Every call is bounded by the client
/// timeout; a timeout surfaces as an error and the caller decides what
/// the ledger row should say.
#[derive(Debug)]
pub struct PaymentProviderService {
    secret_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PaymentProviderService {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.processor_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            secret_key: config.processor_secret_key.clone(),
            base_url: config.processor_base_url.clone(),
            client,
        }
    }

    pub async fn create_transfer(
        &self,
        amount_cents: i64,
        destination_ref: &str,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<TransferInitiation, Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::json!({
            "amount": amount_cents,
            "currency": "USD",
            "destination": destination_ref,
            "reference": reference,
            "metadata": metadata,
        });

        let response = self
            .client
            .post(format!("{}/transfers", self.base_url))
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Idempotency-Key", reference)
            .json(&payload)
            .send()
            .await?;

        let response_body: serde_json::Value = response.json().await?;

        if response_body["status"].as_bool().unwrap_or(false) {
            let data = &response_body["data"];
            Ok(TransferInitiation {
                transfer_id: data["transfer_id"].as_str().unwrap_or("").to_string(),
                reference: data["reference"].as_str().unwrap_or(reference).to_string(),
                status: data["status"].as_str().unwrap_or("pending").to_string(),
            })
        } else {
            Err(response_body["message"]
                .as_str()
                .unwrap_or("Transfer creation failed")
                .into())
        }
    }
}
