use crate::providers::error::ProviderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Paystack,
    Flutterwave,
    Momo,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Paystack => "paystack",
            ProviderName::Flutterwave => "flutterwave",
            ProviderName::Momo => "momo",
        }
    }

    /// Header each provider uses to carry its webhook signature.
    pub fn signature_header(&self) -> &'static str {
        match self {
            ProviderName::Paystack => "x-paystack-signature",
            ProviderName::Flutterwave => "verif-hash",
            ProviderName::Momo => "x-momo-signature",
        }
    }

    /// Whether the provider performs a GET challenge/verification handshake
    /// against the webhook URL before enabling deliveries.
    pub fn supports_challenge(&self) -> bool {
        matches!(self, ProviderName::Momo)
    }

    pub fn all() -> &'static [ProviderName] {
        &[
            ProviderName::Paystack,
            ProviderName::Flutterwave,
            ProviderName::Momo,
        ]
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "paystack" => Ok(ProviderName::Paystack),
            "flutterwave" => Ok(ProviderName::Flutterwave),
            "momo" | "mobile_money" => Ok(ProviderName::Momo),
            _ => Err(ProviderError::Validation {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Three-way outcome every provider vocabulary is mapped into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Succeeded,
    Failed,
    Pending,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Succeeded => "succeeded",
            EventOutcome::Failed => "failed",
            EventOutcome::Pending => "pending",
        }
    }
}

/// Provider-agnostic representation of a webhook delivery or a status poll.
///
/// `provider_event_id` is `None` for providers whose callbacks carry no stable
/// event identifier and for all poll results; such events are never
/// deduplicated by the ledger and rely on intent-level idempotency instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub provider: ProviderName,
    pub provider_event_id: Option<String>,
    pub provider_reference: String,
    pub provider_transaction_id: Option<String>,
    pub outcome: EventOutcome,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_parsing_works() {
        assert!(matches!(
            ProviderName::from_str("paystack"),
            Ok(ProviderName::Paystack)
        ));
        assert!(matches!(
            ProviderName::from_str(" Mobile_Money "),
            Ok(ProviderName::Momo)
        ));
        assert!(ProviderName::from_str("stripe").is_err());
    }

    #[test]
    fn signature_headers_are_provider_specific() {
        assert_eq!(
            ProviderName::Paystack.signature_header(),
            "x-paystack-signature"
        );
        assert_eq!(ProviderName::Flutterwave.signature_header(), "verif-hash");
    }

    #[test]
    fn only_momo_supports_challenge_handshake() {
        assert!(ProviderName::Momo.supports_challenge());
        assert!(!ProviderName::Paystack.supports_challenge());
        assert!(!ProviderName::Flutterwave.supports_challenge());
    }
}
