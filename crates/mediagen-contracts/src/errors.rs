use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::ProviderId;

/// Caller-visible failure categories shared by dispatch and polling results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RequestInvalid,
    ProviderUnavailable,
    ProviderError,
    JobFailed,
    JobTimedOut,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestInvalid => "request_invalid",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ProviderError => "provider_error",
            Self::JobFailed => "job_failed",
            Self::JobTimedOut => "job_timed_out",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("invalid request: {0}")]
    RequestInvalid(String),

    #[error("provider '{provider}' has no credential configured")]
    ProviderUnavailable { provider: ProviderId },

    #[error("provider '{provider}' failed: {message}")]
    Provider {
        provider: ProviderId,
        message: String,
    },

    #[error("job {job_id} failed on '{provider}': {message}")]
    JobFailed {
        provider: ProviderId,
        job_id: String,
        message: String,
    },

    #[error("job {job_id} on '{provider}' timed out after {attempts} poll attempts")]
    JobTimedOut {
        provider: ProviderId,
        job_id: String,
        attempts: u32,
    },

    #[error("every provider in the fallback chain failed: {0}")]
    ProvidersExhausted(String),
}

impl GenerationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::RequestInvalid(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestInvalid(_) => ErrorKind::RequestInvalid,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::Provider { .. } | Self::ProvidersExhausted(_) => ErrorKind::ProviderError,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::JobTimedOut { .. } => ErrorKind::JobTimedOut,
        }
    }

    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            Self::RequestInvalid(_) | Self::ProvidersExhausted(_) => None,
            Self::ProviderUnavailable { provider }
            | Self::Provider { provider, .. }
            | Self::JobFailed { provider, .. }
            | Self::JobTimedOut { provider, .. } => Some(*provider),
        }
    }
}
