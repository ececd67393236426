//! Background sweep for abandoned payment attempts.
//!
//! A pending intent whose customer never completed the provider flow produces
//! no webhook at all; this worker moves such intents to `expired` after a
//! configurable age. Expiry goes through the same conditional-write rule as
//! every other transition, so a concurrent webhook landing a terminal status
//! always wins.

use crate::store::intents::PaymentIntentStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IntentExpiryConfig {
    /// How often the worker wakes up to sweep.
    pub poll_interval: Duration,
    /// Age after which a still-pending intent is abandoned.
    pub pending_ttl: Duration,
}

impl Default for IntentExpiryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            pending_ttl: Duration::from_secs(1800),
        }
    }
}

impl IntentExpiryConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.poll_interval = Duration::from_secs(
            std::env::var("INTENT_EXPIRY_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.pending_ttl = Duration::from_secs(
            std::env::var("INTENT_EXPIRY_PENDING_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.pending_ttl.as_secs()),
        );
        cfg
    }
}

pub struct IntentExpiryWorker {
    intents: Arc<dyn PaymentIntentStore>,
    config: IntentExpiryConfig,
}

impl IntentExpiryWorker {
    pub fn new(intents: Arc<dyn PaymentIntentStore>, config: IntentExpiryConfig) -> Self {
        Self { intents, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            pending_ttl_secs = self.config.pending_ttl.as_secs(),
            "intent expiry worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("intent expiry worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "intent expiry cycle failed");
                    }
                }
            }
        }

        info!("intent expiry worker stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.pending_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(1800));
        let expired = self.intents.expire_stale(cutoff).await?;
        if expired > 0 {
            info!(expired, "expired stale payment intents");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::ProviderName;
    use crate::store::intents::{IntentStatus, NewPaymentIntent};
    use crate::store::memory::InMemoryPaymentIntentStore;

    #[tokio::test]
    async fn sweep_expires_only_stale_pending_intents() {
        let store = Arc::new(InMemoryPaymentIntentStore::new());
        let stale = store
            .create(NewPaymentIntent {
                provider: ProviderName::Paystack,
                provider_reference: "ord_stale".to_string(),
                amount_minor: 1000,
                currency: "GHS".to_string(),
                order_id: None,
                customer_id: None,
            })
            .await
            .unwrap();
        let settled = store
            .create(NewPaymentIntent {
                provider: ProviderName::Paystack,
                provider_reference: "ord_settled".to_string(),
                amount_minor: 1000,
                currency: "GHS".to_string(),
                order_id: None,
                customer_id: None,
            })
            .await
            .unwrap();
        store
            .transition(settled.id, IntentStatus::Succeeded)
            .await
            .unwrap();

        // Cutoff in the future: everything still pending is stale.
        let expired = store
            .expire_stale(Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let stale = store.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, IntentStatus::Expired);
        let settled = store.find_by_id(settled.id).await.unwrap().unwrap();
        assert_eq!(settled.status, IntentStatus::Succeeded);
    }
}
