use thiserror::Error;

use crate::types::ProviderKind;

/// Errors returned by the provider adapter.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    /// The provider answered 2xx but the payload had an unexpected shape.
    #[error("failed to decode {provider} response: {message}")]
    Decode {
        provider: ProviderKind,
        message: String,
    },

    /// The provider produced no text at all.
    #[error("{0} returned an empty response")]
    EmptyResponse(ProviderKind),

    /// A streamed reply stopped before the provider's final frame.
    #[error("{0} stream ended before the reply was complete")]
    Truncated(ProviderKind),

    /// The requested model name cannot be placed in a request URL.
    #[error("invalid model name '{model}' for {provider}")]
    InvalidModel {
        provider: ProviderKind,
        model: String,
    },

    /// The provider is known but lacks the settings it needs (e.g. an API key).
    #[error("{provider} is not configured: {message}")]
    NotConfigured {
        provider: ProviderKind,
        message: String,
    },

    /// The caller asked for a provider name that is not in the lookup table.
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// The request exceeded its deadline.
    #[error("{0} request timed out")]
    Timeout(ProviderKind),

    /// The provider's service could not be reached.
    #[error("{0} is unavailable")]
    Unavailable(ProviderKind),
}

impl LlmError {
    /// Map a transport error, keeping timeouts and refused connections distinct.
    pub(crate) fn from_transport(provider: ProviderKind, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(provider)
        } else if err.is_connect() {
            LlmError::Unavailable(provider)
        } else {
            LlmError::Http(err)
        }
    }

    /// The provider that produced this error, when known.
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            LlmError::Status { provider, .. }
            | LlmError::Decode { provider, .. }
            | LlmError::NotConfigured { provider, .. }
            | LlmError::InvalidModel { provider, .. } => Some(*provider),
            LlmError::EmptyResponse(p)
            | LlmError::Truncated(p)
            | LlmError::Timeout(p)
            | LlmError::Unavailable(p) => Some(*p),
            LlmError::Http(_) | LlmError::UnknownProvider(_) => None,
        }
    }
}
