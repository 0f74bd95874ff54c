use atelier_core::error_codes;

/// Typed failures of a provider call. All of them are terminal for the
/// job that triggered the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider throttled the request.
    #[error("Provider rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        /// Seconds the provider asked us to wait, when it said so.
        retry_after_secs: Option<u64>,
    },

    /// The provider rejected the request payload.
    #[error("Provider rejected the request: {0}")]
    InvalidRequest(String),

    /// Network failure, server error, or a response that breaks the
    /// adapter contract.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// The code recorded in the failed job's `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => error_codes::RATE_LIMITED,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::Unavailable(_) => error_codes::PROVIDER_UNAVAILABLE,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
