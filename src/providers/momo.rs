use crate::providers::adapter::ProviderAdapter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::http::{verify_hmac_sha256_hex, ProviderHttpClient};
use crate::providers::types::{EventOutcome, NormalizedEvent, ProviderName};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

/// Result codes the mobile-money gateway reports for a settled collection.
///
/// Assembled from sandbox traffic; the gateway documentation does not publish
/// an exhaustive table, so treat this set as provisional and extend it as new
/// codes show up in the ledger.
const SUCCESS_CODES: &[&str] = &["0", "00", "000"];
const FAILURE_CODES: &[&str] = &["100", "529", "600", "682"];

const SUCCESS_STATUSES: &[&str] = &["successful", "success"];
const FAILURE_STATUSES: &[&str] = &["failed", "rejected", "timeout", "expired"];

#[derive(Debug, Clone)]
pub struct MomoCredentials {
    /// Shared secret for the callback HMAC.
    pub webhook_secret: String,
    /// Subscription key sent on status queries.
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MomoCredentials {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            api_key: String::new(),
            base_url: "https://api.mobile-money.example.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug)]
pub struct MomoAdapter {
    credentials: MomoCredentials,
    http: ProviderHttpClient,
}

impl MomoAdapter {
    pub fn new(credentials: MomoCredentials) -> ProviderResult<Self> {
        if credentials.webhook_secret.trim().is_empty() {
            return Err(ProviderError::Validation {
                message: "momo webhook secret is not configured".to_string(),
                field: Some("webhook_secret".to_string()),
            });
        }
        let http = ProviderHttpClient::new(
            Duration::from_secs(credentials.timeout_secs),
            credentials.max_retries,
        )?;
        Ok(Self { credentials, http })
    }

    fn map_outcome(status: Option<&str>, result_code: Option<&str>) -> EventOutcome {
        if let Some(status) = status {
            let status = status.to_lowercase();
            if SUCCESS_STATUSES.contains(&status.as_str()) {
                return EventOutcome::Succeeded;
            }
            if FAILURE_STATUSES.contains(&status.as_str()) {
                return EventOutcome::Failed;
            }
        }
        if let Some(code) = result_code {
            if SUCCESS_CODES.contains(&code) {
                return EventOutcome::Succeeded;
            }
            if FAILURE_CODES.contains(&code) {
                return EventOutcome::Failed;
            }
        }
        // Unknown vocabulary stays pending rather than guessing a terminal
        // outcome from an unrecognized code.
        EventOutcome::Pending
    }

    // Callback amounts arrive as decimal strings in major units.
    fn parse_amount_minor(amount: Option<&str>) -> Option<i64> {
        amount
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| (v * 100.0).round() as i64)
    }
}

#[async_trait]
impl ProviderAdapter for MomoAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Momo
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha256_hex(raw_body, &self.credentials.webhook_secret, signature)
    }

    fn normalize_event(&self, raw_body: &[u8]) -> ProviderResult<NormalizedEvent> {
        let callback: MomoCallback =
            serde_json::from_slice(raw_body).map_err(|e| ProviderError::MalformedPayload {
                message: format!("invalid momo callback: {}", e),
            })?;

        Ok(NormalizedEvent {
            provider: ProviderName::Momo,
            // Callbacks carry no stable event identifier; deduplication falls
            // through to the intent-level no-op.
            provider_event_id: None,
            provider_reference: callback.external_id,
            provider_transaction_id: callback.financial_transaction_id,
            outcome: Self::map_outcome(
                callback.status.as_deref(),
                callback.result_code.as_deref(),
            ),
            amount_minor: Self::parse_amount_minor(callback.amount.as_deref()),
            currency: callback.currency,
            occurred_at: Utc::now(),
        })
    }

    async fn query_status(&self, reference: &str) -> ProviderResult<NormalizedEvent> {
        if reference.trim().is_empty() {
            return Err(ProviderError::Validation {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }

        let raw: MomoStatusResponse = self
            .http
            .request_json(
                reqwest::Method::GET,
                &format!(
                    "{}/collection/v1_0/requesttopay/{}",
                    self.credentials.base_url, reference
                ),
                None,
                None,
                &[("Ocp-Apim-Subscription-Key", &self.credentials.api_key)],
            )
            .await?;

        Ok(NormalizedEvent {
            provider: ProviderName::Momo,
            provider_event_id: None,
            provider_reference: reference.to_string(),
            provider_transaction_id: raw.financial_transaction_id,
            outcome: Self::map_outcome(raw.status.as_deref(), raw.reason.as_deref()),
            amount_minor: Self::parse_amount_minor(raw.amount.as_deref()),
            currency: raw.currency,
            occurred_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MomoCallback {
    external_id: String,
    #[serde(default)]
    financial_transaction_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result_code: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MomoStatusResponse {
    #[serde(default)]
    financial_transaction_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}
