use crate::providers::error::ProviderResult;
use crate::providers::types::{NormalizedEvent, ProviderName};
use async_trait::async_trait;

/// Capability set every payment provider integration implements.
///
/// Adapters are stateless beyond their credentials: one instance is built per
/// request from the resolved provider configuration, mirroring how credentials
/// can be rotated in the config store without a restart.
#[async_trait]
pub trait ProviderAdapter: std::fmt::Debug + Send + Sync {
    fn name(&self) -> ProviderName;

    /// Checks the provider signature over the raw, unparsed request body.
    ///
    /// Returns `false` (never an error) on malformed input — a verification
    /// failure is an expected outcome, not an exceptional one.
    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool;

    /// Parses a provider webhook payload into the normalized shape. The parse
    /// is typed per provider; unrecognized payloads fail here, at the adapter
    /// boundary, with a clear error.
    fn normalize_event(&self, raw_body: &[u8]) -> ProviderResult<NormalizedEvent>;

    /// Actively queries the provider for the current status of a reference.
    /// Produces the same normalized shape as webhook events so both ingestion
    /// paths share one apply step. Network failures surface as retryable
    /// errors, distinct from a provider-reported failure outcome.
    async fn query_status(&self, reference: &str) -> ProviderResult<NormalizedEvent>;
}
