use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

/// Persisted provider configuration: display metadata, flags, and the
/// per-provider credential key-value map. Mutation is owned by external
/// settings actions; this core only reads.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProviderConfig {
    pub provider: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub is_primary: bool,
    pub test_mode: bool,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    /// Looks up a credential value from the settings map.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait ProviderConfigStore: Send + Sync {
    async fn find_by_provider(&self, provider: &str)
        -> Result<Option<ProviderConfig>, StoreError>;

    async fn find_enabled(&self) -> Result<Vec<ProviderConfig>, StoreError>;
}

pub struct PgProviderConfigStore {
    pool: PgPool,
}

impl PgProviderConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONFIG_COLUMNS: &str = "provider, display_name, is_enabled, is_primary, test_mode, \
     settings, created_at, updated_at";

#[async_trait]
impl ProviderConfigStore for PgProviderConfigStore {
    async fn find_by_provider(
        &self,
        provider: &str,
    ) -> Result<Option<ProviderConfig>, StoreError> {
        sqlx::query_as::<_, ProviderConfig>(&format!(
            "SELECT {} FROM payment_providers WHERE provider = $1",
            CONFIG_COLUMNS
        ))
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_enabled(&self) -> Result<Vec<ProviderConfig>, StoreError> {
        sqlx::query_as::<_, ProviderConfig>(&format!(
            "SELECT {} FROM payment_providers WHERE is_enabled = true ORDER BY provider",
            CONFIG_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_lookup_reads_the_credential_map() {
        let config = ProviderConfig {
            provider: "paystack".to_string(),
            display_name: "Paystack".to_string(),
            is_enabled: true,
            is_primary: true,
            test_mode: false,
            settings: serde_json::json!({"secret_key": "sk_live_x", "webhook_secret": "wh_y"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(config.setting("secret_key"), Some("sk_live_x"));
        assert_eq!(config.setting("missing"), None);
    }
}
