use crate::providers::adapter::ProviderAdapter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::http::{secure_eq, ProviderHttpClient};
use crate::providers::types::{EventOutcome, NormalizedEvent, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FlutterwaveCredentials {
    pub secret_key: String,
    /// The static hash configured in the Flutterwave dashboard and echoed in
    /// the `verif-hash` header of every webhook delivery.
    pub webhook_hash: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for FlutterwaveCredentials {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_hash: None,
            base_url: "https://api.flutterwave.com/v3".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug)]
pub struct FlutterwaveAdapter {
    credentials: FlutterwaveCredentials,
    http: ProviderHttpClient,
}

impl FlutterwaveAdapter {
    pub fn new(credentials: FlutterwaveCredentials) -> ProviderResult<Self> {
        if credentials.secret_key.trim().is_empty() {
            return Err(ProviderError::Validation {
                message: "flutterwave secret key is not configured".to_string(),
                field: Some("secret_key".to_string()),
            });
        }
        let http = ProviderHttpClient::new(
            Duration::from_secs(credentials.timeout_secs),
            credentials.max_retries,
        )?;
        Ok(Self { credentials, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    fn map_status(status: &str) -> EventOutcome {
        match status.to_lowercase().as_str() {
            "successful" | "success" | "completed" => EventOutcome::Succeeded,
            "failed" | "cancelled" => EventOutcome::Failed,
            _ => EventOutcome::Pending,
        }
    }

    // Flutterwave reports amounts in major units; the intent stores minor
    // units, so scale by 100 for the two-decimal currencies it settles in.
    fn to_minor(amount: f64) -> i64 {
        (amount * 100.0).round() as i64
    }
}

#[async_trait]
impl ProviderAdapter for FlutterwaveAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Flutterwave
    }

    fn verify_signature(&self, _raw_body: &[u8], signature: &str) -> bool {
        match self.credentials.webhook_hash.as_deref() {
            Some(expected) => secure_eq(expected.trim().as_bytes(), signature.trim().as_bytes()),
            None => false,
        }
    }

    fn normalize_event(&self, raw_body: &[u8]) -> ProviderResult<NormalizedEvent> {
        let webhook: FlutterwaveWebhook =
            serde_json::from_slice(raw_body).map_err(|e| ProviderError::MalformedPayload {
                message: format!("invalid flutterwave webhook: {}", e),
            })?;

        let outcome = match webhook.event.as_str() {
            "charge.completed" => webhook
                .data
                .status
                .as_deref()
                .map(Self::map_status)
                .unwrap_or(EventOutcome::Pending),
            "charge.failed" => EventOutcome::Failed,
            _ => EventOutcome::Pending,
        };

        let provider_event_id = webhook
            .id
            .map(|id| id.to_string())
            .or_else(|| webhook.data.id.map(|id| id.to_string()));

        let occurred_at = webhook
            .data
            .created_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(NormalizedEvent {
            provider: ProviderName::Flutterwave,
            provider_event_id,
            provider_reference: webhook.data.tx_ref,
            provider_transaction_id: webhook
                .data
                .flw_ref
                .or_else(|| webhook.data.id.map(|id| id.to_string())),
            outcome,
            amount_minor: webhook.data.amount.map(Self::to_minor),
            currency: webhook.data.currency,
            occurred_at,
        })
    }

    async fn query_status(&self, reference: &str) -> ProviderResult<NormalizedEvent> {
        if reference.trim().is_empty() {
            return Err(ProviderError::Validation {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }

        let raw: FlutterwaveEnvelope<FlutterwaveVerifyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!(
                    "/transactions/verify_by_reference?tx_ref={}",
                    reference
                )),
                Some(&self.credentials.secret_key),
                None,
                &[],
            )
            .await?;
        if raw.status != "success" {
            return Err(ProviderError::Provider {
                provider: "flutterwave".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }

        Ok(NormalizedEvent {
            provider: ProviderName::Flutterwave,
            provider_event_id: None,
            provider_reference: reference.to_string(),
            provider_transaction_id: raw
                .data
                .flw_ref
                .or_else(|| raw.data.id.map(|id| id.to_string())),
            outcome: raw
                .data
                .status
                .as_deref()
                .map(Self::map_status)
                .unwrap_or(EventOutcome::Pending),
            amount_minor: raw.data.amount.map(Self::to_minor),
            currency: raw.data.currency,
            occurred_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FlutterwaveWebhook {
    event: String,
    #[serde(default)]
    id: Option<i64>,
    data: FlutterwaveWebhookData,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveWebhookData {
    tx_ref: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    flw_ref: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveEnvelope<T> {
    status: String,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveVerifyData {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    flw_ref: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> FlutterwaveAdapter {
        FlutterwaveAdapter::new(FlutterwaveCredentials {
            secret_key: "FLWSECK_TEST".to_string(),
            webhook_hash: Some("hash_123".to_string()),
            ..Default::default()
        })
        .expect("adapter init should succeed")
    }

    #[test]
    fn webhook_hash_comparison_is_exact() {
        let adapter = adapter();
        let payload = br#"{"event":"charge.completed"}"#;
        assert!(adapter.verify_signature(payload, "hash_123"));
        assert!(adapter.verify_signature(payload, " hash_123 "));
        assert!(!adapter.verify_signature(payload, "hash_124"));
    }

    #[test]
    fn missing_webhook_hash_rejects_without_error() {
        let adapter = FlutterwaveAdapter::new(FlutterwaveCredentials {
            secret_key: "FLWSECK_TEST".to_string(),
            webhook_hash: None,
            ..Default::default()
        })
        .unwrap();
        assert!(!adapter.verify_signature(b"{}", "anything"));
    }

    #[test]
    fn normalizes_charge_completed() {
        let adapter = adapter();
        let payload = br#"{
            "event": "charge.completed",
            "id": 445566,
            "data": {
                "id": 112233,
                "tx_ref": "ord_flw_9",
                "flw_ref": "FLW-MOCK-REF",
                "status": "successful",
                "amount": 50.0,
                "currency": "GHS"
            }
        }"#;
        let event = adapter.normalize_event(payload).expect("should normalize");
        assert_eq!(event.outcome, EventOutcome::Succeeded);
        assert_eq!(event.provider_reference, "ord_flw_9");
        assert_eq!(event.provider_event_id.as_deref(), Some("445566"));
        assert_eq!(event.provider_transaction_id.as_deref(), Some("FLW-MOCK-REF"));
        assert_eq!(event.amount_minor, Some(5000));
    }

    #[test]
    fn pending_status_maps_to_pending_outcome() {
        let adapter = adapter();
        let payload =
            br#"{"event":"charge.completed","data":{"tx_ref":"ord_1","status":"pending"}}"#;
        let event = adapter.normalize_event(payload).unwrap();
        assert_eq!(event.outcome, EventOutcome::Pending);
    }
}
