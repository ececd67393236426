use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Malformed webhook payload: {message}")]
    MalformedPayload { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    Provider {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl ProviderError {
    /// Whether a caller-side retry can plausibly change the outcome. Network
    /// and rate-limit failures are transient; a provider-reported decline or a
    /// malformed payload is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Validation { .. } => false,
            ProviderError::Network { .. } => true,
            ProviderError::RateLimit { .. } => true,
            ProviderError::MalformedPayload { .. } => false,
            ProviderError::Provider { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            ProviderError::Validation { .. } => 400,
            ProviderError::Network { .. } => 503,
            ProviderError::RateLimit { .. } => 429,
            ProviderError::MalformedPayload { .. } => 400,
            ProviderError::Provider { .. } => 502,
        }
    }
}
