use crate::providers::adapter::ProviderAdapter;
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::flutterwave::{FlutterwaveAdapter, FlutterwaveCredentials};
use crate::providers::momo::{MomoAdapter, MomoCredentials};
use crate::providers::paystack::{PaystackAdapter, PaystackCredentials};
use crate::providers::types::ProviderName;
use crate::store::provider_configs::{ProviderConfig, ProviderConfigStore};
use std::sync::Arc;
use tracing::warn;

/// Statically configured secrets, used when the persisted provider config has
/// no value for a credential. Kept around for the migration period while
/// credentials move into the `payment_providers` store.
#[derive(Debug, Clone, Default)]
pub struct ProviderSecrets {
    pub paystack_secret_key: Option<String>,
    pub paystack_webhook_secret: Option<String>,
    pub flutterwave_secret_key: Option<String>,
    pub flutterwave_webhook_hash: Option<String>,
    pub momo_webhook_secret: Option<String>,
    pub momo_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl ProviderSecrets {
    pub fn from_env() -> Self {
        Self {
            paystack_secret_key: std::env::var("PAYSTACK_SECRET_KEY").ok(),
            paystack_webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
            flutterwave_secret_key: std::env::var("FLUTTERWAVE_SECRET_KEY").ok(),
            flutterwave_webhook_hash: std::env::var("FLUTTERWAVE_WEBHOOK_HASH").ok(),
            momo_webhook_secret: std::env::var("MOMO_WEBHOOK_SECRET").ok(),
            momo_api_key: std::env::var("MOMO_API_KEY").ok(),
            request_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("PROVIDER_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        }
    }
}

/// Builds adapters from persisted provider configuration, falling back to the
/// static secrets where the store has no value.
pub struct ProviderRegistry {
    configs: Arc<dyn ProviderConfigStore>,
    fallback: ProviderSecrets,
}

impl ProviderRegistry {
    pub fn new(configs: Arc<dyn ProviderConfigStore>, fallback: ProviderSecrets) -> Self {
        Self { configs, fallback }
    }

    pub async fn resolve(
        &self,
        provider: ProviderName,
    ) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let config = match self.configs.find_by_provider(provider.as_str()).await {
            Ok(config) => config,
            Err(e) => {
                // Config-store unavailability must not take webhook ingestion
                // down while static secrets can still verify deliveries.
                warn!(provider = %provider, error = %e, "provider config lookup failed, using static credentials");
                None
            }
        };

        if let Some(config) = &config {
            if !config.is_enabled {
                return Err(ProviderError::Validation {
                    message: format!("provider {} is disabled", provider),
                    field: Some("provider".to_string()),
                });
            }
        }

        match provider {
            ProviderName::Paystack => {
                let credentials = PaystackCredentials {
                    secret_key: self.credential(
                        config.as_ref(),
                        "secret_key",
                        self.fallback.paystack_secret_key.as_deref(),
                    )?,
                    webhook_secret: self.optional_credential(
                        config.as_ref(),
                        "webhook_secret",
                        self.fallback.paystack_webhook_secret.as_deref(),
                    ),
                    timeout_secs: self.fallback.request_timeout_secs,
                    max_retries: self.fallback.max_retries,
                    ..Default::default()
                };
                Ok(Arc::new(PaystackAdapter::new(credentials)?))
            }
            ProviderName::Flutterwave => {
                let credentials = FlutterwaveCredentials {
                    secret_key: self.credential(
                        config.as_ref(),
                        "secret_key",
                        self.fallback.flutterwave_secret_key.as_deref(),
                    )?,
                    webhook_hash: self.optional_credential(
                        config.as_ref(),
                        "webhook_hash",
                        self.fallback.flutterwave_webhook_hash.as_deref(),
                    ),
                    timeout_secs: self.fallback.request_timeout_secs,
                    max_retries: self.fallback.max_retries,
                    ..Default::default()
                };
                Ok(Arc::new(FlutterwaveAdapter::new(credentials)?))
            }
            ProviderName::Momo => {
                let credentials = MomoCredentials {
                    webhook_secret: self.credential(
                        config.as_ref(),
                        "webhook_secret",
                        self.fallback.momo_webhook_secret.as_deref(),
                    )?,
                    api_key: self
                        .optional_credential(
                            config.as_ref(),
                            "api_key",
                            self.fallback.momo_api_key.as_deref(),
                        )
                        .unwrap_or_default(),
                    timeout_secs: self.fallback.request_timeout_secs,
                    max_retries: self.fallback.max_retries,
                    ..Default::default()
                };
                Ok(Arc::new(MomoAdapter::new(credentials)?))
            }
        }
    }

    fn credential(
        &self,
        config: Option<&ProviderConfig>,
        key: &str,
        fallback: Option<&str>,
    ) -> ProviderResult<String> {
        self.optional_credential(config, key, fallback)
            .ok_or_else(|| ProviderError::Validation {
                message: format!("credential {} is not configured", key),
                field: Some(key.to_string()),
            })
    }

    fn optional_credential(
        &self,
        config: Option<&ProviderConfig>,
        key: &str,
        fallback: Option<&str>,
    ) -> Option<String> {
        config
            .and_then(|c| c.setting(key))
            .filter(|v| !v.trim().is_empty())
            .or(fallback.filter(|v| !v.trim().is_empty()))
            .map(|v| v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryProviderConfigStore;
    use chrono::Utc;

    fn config(provider: &str, enabled: bool, settings: serde_json::Value) -> ProviderConfig {
        ProviderConfig {
            provider: provider.to_string(),
            display_name: provider.to_string(),
            is_enabled: enabled,
            is_primary: false,
            test_mode: true,
            settings,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolves_adapter_from_persisted_settings() {
        let store = Arc::new(InMemoryProviderConfigStore::new());
        store.insert(config(
            "paystack",
            true,
            serde_json::json!({"secret_key": "sk_test_abc"}),
        ));
        let registry = ProviderRegistry::new(store, ProviderSecrets::default());
        let adapter = registry.resolve(ProviderName::Paystack).await.unwrap();
        assert_eq!(adapter.name(), ProviderName::Paystack);
    }

    #[tokio::test]
    async fn falls_back_to_static_secrets() {
        let store = Arc::new(InMemoryProviderConfigStore::new());
        let registry = ProviderRegistry::new(
            store,
            ProviderSecrets {
                momo_webhook_secret: Some("env_secret".to_string()),
                ..Default::default()
            },
        );
        let adapter = registry.resolve(ProviderName::Momo).await.unwrap();
        assert_eq!(adapter.name(), ProviderName::Momo);
    }

    #[tokio::test]
    async fn disabled_provider_is_rejected() {
        let store = Arc::new(InMemoryProviderConfigStore::new());
        store.insert(config(
            "flutterwave",
            false,
            serde_json::json!({"secret_key": "FLWSECK"}),
        ));
        let registry = ProviderRegistry::new(store, ProviderSecrets::default());
        let err = registry.resolve(ProviderName::Flutterwave).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[tokio::test]
    async fn missing_credentials_are_a_validation_error() {
        let store = Arc::new(InMemoryProviderConfigStore::new());
        let registry = ProviderRegistry::new(store, ProviderSecrets::default());
        let err = registry.resolve(ProviderName::Paystack).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation { .. }));
    }
}
