use crate::providers::adapter::ProviderAdapter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::http::{verify_hmac_sha512_hex, ProviderHttpClient};
use crate::providers::types::{EventOutcome, NormalizedEvent, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PaystackCredentials {
    pub secret_key: String,
    /// Dedicated webhook secret; the account secret key signs webhooks when
    /// this is not configured.
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackCredentials {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug)]
pub struct PaystackAdapter {
    credentials: PaystackCredentials,
    http: ProviderHttpClient,
}

impl PaystackAdapter {
    pub fn new(credentials: PaystackCredentials) -> ProviderResult<Self> {
        if credentials.secret_key.trim().is_empty() {
            return Err(ProviderError::Validation {
                message: "paystack secret key is not configured".to_string(),
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
        match status {
            "success" => EventOutcome::Succeeded,
            "failed" | "abandoned" | "reversed" => EventOutcome::Failed,
            _ => EventOutcome::Pending,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaystackAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Paystack
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        let secret = self
            .credentials
            .webhook_secret
            .as_deref()
            .unwrap_or(&self.credentials.secret_key);
        verify_hmac_sha512_hex(raw_body, secret, signature)
    }

    fn normalize_event(&self, raw_body: &[u8]) -> ProviderResult<NormalizedEvent> {
        let webhook: PaystackWebhook =
            serde_json::from_slice(raw_body).map_err(|e| ProviderError::MalformedPayload {
                message: format!("invalid paystack webhook: {}", e),
            })?;

        let outcome = match webhook.event.as_str() {
            "charge.success" => EventOutcome::Succeeded,
            "charge.failed" => EventOutcome::Failed,
            _ => webhook
                .data
                .status
                .as_deref()
                .map(Self::map_status)
                .unwrap_or(EventOutcome::Pending),
        };

        let provider_event_id = webhook
            .id
            .map(|id| id.to_string())
            .or_else(|| webhook.data.id.map(|id| id.to_string()));

        let occurred_at = webhook
            .data
            .paid_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(NormalizedEvent {
            provider: ProviderName::Paystack,
            provider_event_id,
            provider_reference: webhook.data.reference,
            provider_transaction_id: webhook.data.id.map(|id| id.to_string()),
            outcome,
            amount_minor: webhook.data.amount,
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

        let raw: PaystackEnvelope<PaystackVerifyData> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                Some(&self.credentials.secret_key),
                None,
                &[],
            )
            .await?;
        if !raw.status {
            return Err(ProviderError::Provider {
                provider: "paystack".to_string(),
                message: raw.message,
                provider_code: None,
                retryable: false,
            });
        }

        let occurred_at = raw
            .data
            .paid_at
            .as_deref()
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(NormalizedEvent {
            provider: ProviderName::Paystack,
            provider_event_id: None,
            provider_reference: reference.to_string(),
            provider_transaction_id: raw.data.id.map(|id| id.to_string()),
            outcome: Self::map_status(&raw.data.status),
            amount_minor: Some(raw.data.amount),
            currency: Some(raw.data.currency),
            occurred_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackWebhook {
    event: String,
    #[serde(default)]
    id: Option<i64>,
    data: PaystackWebhookData,
}

#[derive(Debug, Deserialize)]
struct PaystackWebhookData {
    reference: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    paid_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    #[serde(default)]
    id: Option<i64>,
    amount: i64,
    currency: String,
    status: String,
    #[serde(default)]
    paid_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    fn adapter() -> PaystackAdapter {
        PaystackAdapter::new(PaystackCredentials {
            secret_key: "sk_test".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            ..Default::default()
        })
        .expect("adapter init should succeed")
    }

    fn sign(payload: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn rejects_invalid_signature() {
        let adapter = adapter();
        let payload = br#"{"event":"charge.success"}"#;
        assert!(!adapter.verify_signature(payload, "invalid_signature"));
    }

    #[test]
    fn accepts_valid_signature_with_webhook_secret() {
        let adapter = adapter();
        let payload = br#"{"event":"charge.success","data":{"reference":"ord_1"}}"#;
        let signature = sign(payload, "whsec_test");
        assert!(adapter.verify_signature(payload, &signature));
        // Signed with the account key instead of the webhook secret.
        let wrong = sign(payload, "sk_test");
        assert!(!adapter.verify_signature(payload, &wrong));
    }

    #[test]
    fn normalizes_charge_success() {
        let adapter = adapter();
        let payload = br#"{
            "event": "charge.success",
            "id": 9911,
            "data": {
                "id": 772211,
                "reference": "ord_abc123",
                "status": "success",
                "amount": 5000,
                "currency": "GHS",
                "paid_at": "2026-03-01T12:30:00Z"
            }
        }"#;
        let event = adapter.normalize_event(payload).expect("should normalize");
        assert_eq!(event.outcome, EventOutcome::Succeeded);
        assert_eq!(event.provider_reference, "ord_abc123");
        assert_eq!(event.provider_event_id.as_deref(), Some("9911"));
        assert_eq!(event.provider_transaction_id.as_deref(), Some("772211"));
        assert_eq!(event.amount_minor, Some(5000));
        assert_eq!(event.currency.as_deref(), Some("GHS"));
    }

    #[test]
    fn normalizes_charge_failed_and_unknown_events() {
        let adapter = adapter();
        let failed = br#"{"event":"charge.failed","data":{"reference":"ord_1"}}"#;
        let event = adapter.normalize_event(failed).unwrap();
        assert_eq!(event.outcome, EventOutcome::Failed);

        let other = br#"{"event":"subscription.create","data":{"reference":"ord_2"}}"#;
        let event = adapter.normalize_event(other).unwrap();
        assert_eq!(event.outcome, EventOutcome::Pending);
    }

    #[test]
    fn malformed_payload_fails_at_the_boundary() {
        let adapter = adapter();
        let result = adapter.normalize_event(b"not json at all");
        assert!(matches!(
            result,
            Err(ProviderError::MalformedPayload { .. })
        ));
        // Missing the reference field entirely.
        let result = adapter.normalize_event(br#"{"event":"charge.success","data":{}}"#);
        assert!(matches!(
            result,
            Err(ProviderError::MalformedPayload { .. })
        ));
    }
}
