use crate::providers::registry::ProviderRegistry;
use crate::providers::types::ProviderName;
use crate::reconcile::orchestrator::{ReconcileError, ReconciliationService};
use crate::store::intents::IntentStatus;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Customer-facing status for the waiting page. Internal error taxonomy never
/// leaks here; the page only ever sees one of these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Succeeded,
    Failed,
    Pending,
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::Succeeded => "succeeded",
            VerifyStatus::Failed => "failed",
            VerifyStatus::Pending => "pending",
        }
    }

    fn from_intent(status: IntentStatus) -> Self {
        match status {
            IntentStatus::Succeeded => VerifyStatus::Succeeded,
            IntentStatus::Failed | IntentStatus::Cancelled | IntentStatus::Expired => {
                VerifyStatus::Failed
            }
            IntentStatus::Pending | IntentStatus::Processing => VerifyStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: VerifyStatus,
    pub intent_id: Uuid,
    pub order_id: Option<Uuid>,
}

/// Synchronous fallback for delayed webhooks: actively queries the provider
/// and funnels the result through the same apply path as webhook events. One
/// call per client poll; the retry budget lives client-side.
pub struct PollingVerifier {
    registry: Arc<ProviderRegistry>,
    service: Arc<ReconciliationService>,
}

impl PollingVerifier {
    pub fn new(registry: Arc<ProviderRegistry>, service: Arc<ReconciliationService>) -> Self {
        Self { registry, service }
    }

    pub async fn verify(
        &self,
        provider: ProviderName,
        reference: &str,
    ) -> Result<VerifyOutcome, ReconcileError> {
        let adapter = self.registry.resolve(provider).await?;
        // Network failures propagate as retryable provider errors; the
        // polling page absorbs them until its attempt budget runs out.
        let event = adapter.query_status(reference).await?;

        info!(
            provider = %provider,
            reference = %reference,
            outcome = event.outcome.as_str(),
            "status poll completed"
        );

        let intent = self.service.ingest_polled(&event).await?;
        Ok(VerifyOutcome {
            status: VerifyStatus::from_intent(intent.status),
            intent_id: intent.id,
            order_id: intent.order_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_statuses_collapse_to_three_client_states() {
        assert_eq!(
            VerifyStatus::from_intent(IntentStatus::Succeeded),
            VerifyStatus::Succeeded
        );
        for status in [
            IntentStatus::Failed,
            IntentStatus::Cancelled,
            IntentStatus::Expired,
        ] {
            assert_eq!(VerifyStatus::from_intent(status), VerifyStatus::Failed);
        }
        for status in [IntentStatus::Pending, IntentStatus::Processing] {
            assert_eq!(VerifyStatus::from_intent(status), VerifyStatus::Pending);
        }
    }
}
