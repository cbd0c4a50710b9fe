use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, GenerationError};
use crate::providers::ProviderId;

/// Opaque reference to an asynchronous provider job. Round-trips through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub provider: ProviderId,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, provider: ProviderId) -> Self {
        Self {
            job_id: job_id.into(),
            provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Immediate {
        provider: ProviderId,
        artifact_url: String,
    },
    Pending(JobHandle),
    Failed {
        provider: ProviderId,
        error: ErrorKind,
        message: String,
    },
}

impl ProviderResult {
    pub fn provider(&self) -> ProviderId {
        match self {
            Self::Immediate { provider, .. } | Self::Failed { provider, .. } => *provider,
            Self::Pending(handle) => handle.provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Processing { progress: u8 },
    Succeeded { artifact_url: String },
    Failed { error: ErrorKind, message: String },
}

impl PollResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Caller-side polling budget for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn for_provider(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Runway => Self::new(Duration::from_secs(5), 60),
            ProviderId::Luma => Self::new(Duration::from_secs(5), 120),
            ProviderId::Stability => Self::new(Duration::from_secs(10), 60),
            ProviderId::Veo => Self::new(Duration::from_secs(10), 120),
            ProviderId::Placeholder => Self::new(Duration::from_secs(2), 60),
            ProviderId::OpenAi | ProviderId::Imagen | ProviderId::Bhindi => {
                Self::new(Duration::from_secs(5), 60)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Succeeded,
    Processing,
    Failed,
}

/// Transport-agnostic result object returned to callers of dispatch and poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub status: Status,
    pub provider: Option<ProviderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl GenerationStatus {
    pub fn failed(provider: Option<ProviderId>, error: ErrorKind, message: String) -> Self {
        Self {
            status: Status::Failed,
            provider,
            artifact_url: None,
            progress: None,
            message: Some(message),
            job: None,
            error_kind: Some(error),
        }
    }

    pub fn from_error(err: &GenerationError) -> Self {
        Self::failed(err.provider(), err.kind(), err.to_string())
    }

    pub fn from_provider_result(result: &ProviderResult, message: Option<String>) -> Self {
        match result {
            ProviderResult::Immediate {
                provider,
                artifact_url,
            } => Self {
                status: Status::Succeeded,
                provider: Some(*provider),
                artifact_url: Some(artifact_url.clone()),
                progress: Some(100),
                message,
                job: None,
                error_kind: None,
            },
            ProviderResult::Pending(handle) => Self {
                status: Status::Processing,
                provider: Some(handle.provider),
                artifact_url: None,
                progress: Some(0),
                message,
                job: Some(handle.clone()),
                error_kind: None,
            },
            ProviderResult::Failed {
                provider,
                error,
                message: detail,
            } => Self::failed(Some(*provider), *error, message.unwrap_or_else(|| detail.clone())),
        }
    }

    pub fn from_poll_result(handle: &JobHandle, result: &PollResult) -> Self {
        match result {
            PollResult::Processing { progress } => Self {
                status: Status::Processing,
                provider: Some(handle.provider),
                artifact_url: None,
                progress: Some(*progress),
                message: None,
                job: Some(handle.clone()),
                error_kind: None,
            },
            PollResult::Succeeded { artifact_url } => Self {
                status: Status::Succeeded,
                provider: Some(handle.provider),
                artifact_url: Some(artifact_url.clone()),
                progress: Some(100),
                message: None,
                job: None,
                error_kind: None,
            },
            PollResult::Failed { error, message } => {
                let mut status = Self::failed(Some(handle.provider), *error, message.clone());
                status.job = Some(handle.clone());
                status
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn job_handle_round_trips_verbatim() -> anyhow::Result<()> {
        let handle = JobHandle::new("4f1c-runway-task", ProviderId::Runway);
        let encoded = serde_json::to_value(&handle)?;
        assert_eq!(
            encoded,
            json!({"job_id": "4f1c-runway-task", "provider": "runway"})
        );
        let decoded: JobHandle = serde_json::from_value(encoded)?;
        assert_eq!(decoded, handle);
        Ok(())
    }

    #[test]
    fn processing_status_carries_the_handle() -> anyhow::Result<()> {
        let handle = JobHandle::new("op/123", ProviderId::Veo);
        let status =
            GenerationStatus::from_poll_result(&handle, &PollResult::Processing { progress: 40 });
        let encoded = serde_json::to_value(&status)?;
        assert_eq!(encoded["status"], json!("processing"));
        assert_eq!(encoded["progress"], json!(40));
        assert_eq!(encoded["job"]["job_id"], json!("op/123"));
        assert!(encoded.get("artifact_url").is_none());
        Ok(())
    }

    #[test]
    fn timed_out_poll_reports_distinct_error_kind() -> anyhow::Result<()> {
        let handle = JobHandle::new("gen-9", ProviderId::Luma);
        let result = PollResult::Failed {
            error: ErrorKind::JobTimedOut,
            message: "gave up".to_string(),
        };
        assert!(result.is_terminal());
        let encoded = serde_json::to_value(GenerationStatus::from_poll_result(&handle, &result))?;
        assert_eq!(encoded["status"], json!("failed"));
        assert_eq!(encoded["error_kind"], json!("job_timed_out"));
        Ok(())
    }

    #[test]
    fn request_errors_serialize_without_provider() -> anyhow::Result<()> {
        let status = GenerationStatus::from_error(&GenerationError::invalid("Prompt is required"));
        let encoded = serde_json::to_value(&status)?;
        assert_eq!(encoded["status"], json!("failed"));
        assert_eq!(encoded["provider"], Value::Null);
        assert_eq!(encoded["error_kind"], json!("request_invalid"));
        assert_eq!(encoded["message"], json!("invalid request: Prompt is required"));
        Ok(())
    }

    #[test]
    fn video_poll_policies_stay_within_budget() {
        for provider in [
            ProviderId::Runway,
            ProviderId::Luma,
            ProviderId::Stability,
            ProviderId::Veo,
        ] {
            let policy = PollPolicy::for_provider(provider);
            assert!((5..=10).contains(&policy.interval.as_secs()));
            assert!((60..=120).contains(&policy.max_attempts));
        }
    }
}
