use mediagen_contracts::{
    validate_artifact_url, CredentialProvider, ErrorKind, EventWriter, GenerationEvent,
    JobHandle, PollPolicy, PollResult, PollState,
};
use serde_json::{json, Value};

use crate::dispatcher::map_object;
use crate::transport::{error_chain_text, is_retryable_transport_error};
use crate::{GenerationProvider, JobStatus, StatusQuery};

/// Caller-driven state machine for one asynchronous job.
///
/// Each non-terminal `poll()` issues exactly one status query. The attempt after
/// `policy.max_attempts` reports `JobTimedOut` without touching the network, and once a
/// terminal result is reached it is returned unchanged on every later call.
pub struct CompletionPoller<'a> {
    provider: Option<&'a dyn GenerationProvider>,
    credentials: &'a dyn CredentialProvider,
    events: Option<EventWriter>,
    handle: JobHandle,
    policy: PollPolicy,
    attempts: u32,
    state: PollState,
    last: Option<PollResult>,
}

impl<'a> CompletionPoller<'a> {
    pub(crate) fn new(
        provider: Option<&'a dyn GenerationProvider>,
        credentials: &'a dyn CredentialProvider,
        handle: JobHandle,
        events: Option<EventWriter>,
    ) -> Self {
        let policy = provider
            .map(|provider| provider.poll_policy())
            .unwrap_or_else(|| PollPolicy::for_provider(handle.provider));
        Self {
            provider,
            credentials,
            events,
            handle,
            policy,
            attempts: 0,
            state: PollState::Pending,
            last: None,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Continues a job polled elsewhere, e.g. by an earlier process holding the same handle.
    pub fn resume_from(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn poll(&mut self) -> PollResult {
        if self.state.is_terminal() {
            if let Some(last) = self.last.as_ref() {
                return last.clone();
            }
        }

        if self.attempts >= self.policy.max_attempts {
            self.attempts = self.attempts.saturating_add(1);
            let message = format!(
                "Job {} on '{}' did not finish within {} poll attempts.",
                self.handle.job_id, self.handle.provider, self.policy.max_attempts
            );
            return self.finish(
                PollState::TimedOut,
                PollResult::Failed {
                    error: ErrorKind::JobTimedOut,
                    message,
                },
            );
        }
        self.attempts += 1;

        let Some(provider) = self.provider else {
            let message = format!(
                "Provider '{}' has no registered video adapter.",
                self.handle.provider
            );
            return self.finish(
                PollState::Failed,
                PollResult::Failed {
                    error: ErrorKind::ProviderUnavailable,
                    message,
                },
            );
        };

        let provider_id = provider.id();
        let credential = if provider_id.requires_credential() {
            match self.credentials.credential(provider_id) {
                Some(credential) => Some(credential),
                None => {
                    let message =
                        format!("Provider '{provider_id}' has no credential configured.");
                    return self.finish(
                        PollState::Failed,
                        PollResult::Failed {
                            error: ErrorKind::ProviderUnavailable,
                            message,
                        },
                    );
                }
            }
        } else {
            None
        };

        let query = StatusQuery {
            job_id: &self.handle.job_id,
            credential: credential.as_deref(),
            attempt: self.attempts,
        };
        let result = match provider.status(&query) {
            Ok(JobStatus::Processing { progress }) => PollResult::Processing {
                progress: progress
                    .map(|value| value.min(99))
                    .unwrap_or_else(|| self.estimated_progress()),
            },
            Ok(JobStatus::Succeeded { artifact_url }) => match validate_artifact_url(&artifact_url)
            {
                Ok(_) => PollResult::Succeeded { artifact_url },
                Err(reason) => PollResult::Failed {
                    error: ErrorKind::ProviderError,
                    message: format!("{provider_id} returned an unusable artifact URL: {reason}"),
                },
            },
            Ok(JobStatus::Failed { message }) => PollResult::Failed {
                error: ErrorKind::JobFailed,
                message,
            },
            Err(err) if is_retryable_transport_error(&err) => {
                tracing::warn!(
                    provider = %provider_id,
                    attempt = self.attempts,
                    error = %error_chain_text(&err, 400),
                    "status query failed; will retry on next poll"
                );
                PollResult::Processing {
                    progress: self.estimated_progress(),
                }
            }
            Err(err) => PollResult::Failed {
                error: ErrorKind::ProviderError,
                message: error_chain_text(&err, 600),
            },
        };

        tracing::debug!(
            provider = %provider_id,
            job_id = %self.handle.job_id,
            attempt = self.attempts,
            terminal = result.is_terminal(),
            "poll attempt"
        );
        self.emit(
            GenerationEvent::PollAttempt,
            json!({
                "provider": provider_id,
                "job_id": self.handle.job_id,
                "attempt": self.attempts,
                "max_attempts": self.policy.max_attempts,
            }),
        );

        match &result {
            PollResult::Processing { .. } => {
                self.last = Some(result.clone());
                result
            }
            PollResult::Succeeded { .. } => self.finish(PollState::Succeeded, result),
            PollResult::Failed { .. } => self.finish(PollState::Failed, result),
        }
    }

    fn estimated_progress(&self) -> u8 {
        let max = self.policy.max_attempts.max(1);
        (self.attempts.saturating_mul(100) / max).min(99) as u8
    }

    fn finish(&mut self, state: PollState, result: PollResult) -> PollResult {
        self.state = state;
        self.last = Some(result.clone());
        match &result {
            PollResult::Failed { error, message } => {
                tracing::warn!(
                    provider = %self.handle.provider,
                    job_id = %self.handle.job_id,
                    error_kind = %error,
                    "{message}"
                );
            }
            _ => tracing::info!(
                provider = %self.handle.provider,
                job_id = %self.handle.job_id,
                attempts = self.attempts,
                "job finished"
            ),
        }
        let (error_kind, message) = match &result {
            PollResult::Failed { error, message } => (Some(*error), Some(message.clone())),
            _ => (None, None),
        };
        self.emit(
            GenerationEvent::JobFinished,
            json!({
                "provider": self.handle.provider,
                "job_id": self.handle.job_id,
                "state": state,
                "attempts": self.attempts,
                "error_kind": error_kind,
                "message": message,
            }),
        );
        result
    }

    fn emit(&self, event: GenerationEvent, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(event, map_object(payload)) {
            tracing::warn!(event = event.as_str(), error = %err, "failed to write event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mediagen_contracts::{ProviderId, ProviderRegistry, StaticCredentials};

    use super::*;
    use crate::testing::{StubProvider, StubStatus};
    use crate::{Dispatcher, PlaceholderVideoProvider, ProviderChain};

    fn dispatcher_with(provider: StubProvider) -> Dispatcher {
        let mut registry: ProviderChain = ProviderRegistry::default();
        registry.register(Box::new(provider));
        registry.register(Box::new(PlaceholderVideoProvider));
        Dispatcher::with_providers(registry)
    }

    fn processing() -> StubStatus {
        StubStatus::Reply(JobStatus::Processing { progress: None })
    }

    #[test]
    fn attempt_after_the_bound_times_out_without_a_status_call() {
        let runway = StubProvider::accepting(ProviderId::Runway, "task-1").with_statuses([processing()]);
        let calls = runway.counters();
        let dispatcher = dispatcher_with(runway);
        let credentials = StaticCredentials::default().with(ProviderId::Runway, "rw-key");
        let mut poller = dispatcher
            .poller(JobHandle::new("task-1", ProviderId::Runway), &credentials)
            .with_policy(PollPolicy::new(Duration::from_secs(5), 60));

        for _ in 0..60 {
            assert!(matches!(poller.poll(), PollResult::Processing { .. }));
        }
        assert_eq!(calls.statuses(), 60);
        assert_eq!(poller.state(), PollState::Pending);

        let timed_out = poller.poll();
        assert!(matches!(
            timed_out,
            PollResult::Failed {
                error: ErrorKind::JobTimedOut,
                ..
            }
        ));
        assert_eq!(poller.state(), PollState::TimedOut);
        assert_eq!(poller.attempts(), 61);
        assert_eq!(calls.statuses(), 60);

        assert_eq!(poller.poll(), timed_out);
        assert_eq!(calls.statuses(), 60);
    }

    #[test]
    fn provider_failure_is_terminal_and_cached() {
        let luma = StubProvider::accepting(ProviderId::Luma, "gen-4").with_statuses([
            processing(),
            StubStatus::Reply(JobStatus::Failed {
                message: "moderation".to_string(),
            }),
        ]);
        let calls = luma.counters();
        let dispatcher = dispatcher_with(luma);
        let credentials = StaticCredentials::default().with(ProviderId::Luma, "lm-key");
        let mut poller = dispatcher.poller(JobHandle::new("gen-4", ProviderId::Luma), &credentials);

        assert!(matches!(poller.poll(), PollResult::Processing { .. }));
        let failed = poller.poll();
        assert_eq!(
            failed,
            PollResult::Failed {
                error: ErrorKind::JobFailed,
                message: "moderation".to_string()
            }
        );
        assert_eq!(poller.state(), PollState::Failed);
        assert_eq!(poller.poll(), failed);
        assert_eq!(calls.statuses(), 2);
    }

    #[test]
    fn missing_credential_at_poll_time_fails_without_a_call() {
        let veo = StubProvider::accepting(ProviderId::Veo, "operations/1").with_statuses([processing()]);
        let calls = veo.counters();
        let dispatcher = dispatcher_with(veo);
        let credentials = StaticCredentials::default();
        let mut poller =
            dispatcher.poller(JobHandle::new("operations/1", ProviderId::Veo), &credentials);

        assert!(matches!(
            poller.poll(),
            PollResult::Failed {
                error: ErrorKind::ProviderUnavailable,
                ..
            }
        ));
        assert_eq!(calls.statuses(), 0);
    }

    #[test]
    fn transport_timeouts_keep_the_job_pending() {
        let runway = StubProvider::accepting(ProviderId::Runway, "task-2").with_statuses([
            StubStatus::TimedOut,
            StubStatus::Reply(JobStatus::Succeeded {
                artifact_url: "https://dnznrvs05pmza.cloudfront.net/task-2.mp4".to_string(),
            }),
        ]);
        let dispatcher = dispatcher_with(runway);
        let credentials = StaticCredentials::default().with(ProviderId::Runway, "rw-key");
        let mut poller = dispatcher
            .poller(JobHandle::new("task-2", ProviderId::Runway), &credentials)
            .with_policy(PollPolicy::new(Duration::from_secs(5), 10));

        assert_eq!(poller.poll(), PollResult::Processing { progress: 10 });
        assert_eq!(poller.state(), PollState::Pending);
        assert!(matches!(poller.poll(), PollResult::Succeeded { .. }));
        assert_eq!(poller.state(), PollState::Succeeded);
    }

    #[test]
    fn http_errors_during_polling_are_provider_errors() {
        let runway = StubProvider::accepting(ProviderId::Runway, "task-3")
            .with_statuses([StubStatus::Rejected("bad gateway".to_string())]);
        let dispatcher = dispatcher_with(runway);
        let credentials = StaticCredentials::default().with(ProviderId::Runway, "rw-key");
        let mut poller = dispatcher.poller(JobHandle::new("task-3", ProviderId::Runway), &credentials);

        let PollResult::Failed { error, message } = poller.poll() else {
            panic!("HTTP error should end the job");
        };
        assert_eq!(error, ErrorKind::ProviderError);
        assert!(message.contains("bad gateway"));
    }

    #[test]
    fn unusable_artifact_url_fails_the_job() {
        let luma = StubProvider::accepting(ProviderId::Luma, "gen-5").with_statuses([
            StubStatus::Reply(JobStatus::Succeeded {
                artifact_url: "not a url".to_string(),
            }),
        ]);
        let dispatcher = dispatcher_with(luma);
        let credentials = StaticCredentials::default().with(ProviderId::Luma, "lm-key");
        let mut poller = dispatcher.poller(JobHandle::new("gen-5", ProviderId::Luma), &credentials);

        assert!(matches!(
            poller.poll(),
            PollResult::Failed {
                error: ErrorKind::ProviderError,
                ..
            }
        ));
    }

    #[test]
    fn resumed_placeholder_job_completes_on_its_fixed_attempt() {
        let dispatcher = Dispatcher::new(&crate::EngineConfig::default());
        let credentials = StaticCredentials::default();
        let handle = JobHandle::new("placeholder-1700000000000-abcdef012", ProviderId::Placeholder);
        let mut poller = dispatcher.poller(handle, &credentials).resume_from(1);
        assert_eq!(poller.policy().max_attempts, 60);
        assert!(matches!(poller.poll(), PollResult::Succeeded { .. }));
        assert_eq!(poller.attempts(), 2);
    }

    #[test]
    fn unknown_provider_handle_fails_cleanly() {
        let dispatcher = Dispatcher::with_providers(ProviderRegistry::default());
        let credentials = StaticCredentials::default();
        let mut poller =
            dispatcher.poller(JobHandle::new("task-9", ProviderId::Runway), &credentials);
        assert!(matches!(
            poller.poll(),
            PollResult::Failed {
                error: ErrorKind::ProviderUnavailable,
                ..
            }
        ));
        assert_eq!(poller.state(), PollState::Failed);
    }

    #[test]
    fn poll_events_are_written_per_attempt() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let dispatcher = Dispatcher::new(&crate::EngineConfig::default())
            .with_events(EventWriter::new(&path, "s-2"));
        let credentials = StaticCredentials::default();
        let fresh_id = format!(
            "placeholder-{}-abcdef012",
            chrono::Utc::now().timestamp_millis()
        );
        let handle = JobHandle::new(fresh_id, ProviderId::Placeholder);
        let mut poller = dispatcher.poller(handle, &credentials);
        while !poller.poll().is_terminal() {}

        let rows: Vec<Value> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let types: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get("type").and_then(Value::as_str))
            .collect();
        assert_eq!(types, vec!["poll_attempt", "poll_attempt", "job_finished"]);
        assert_eq!(rows[2]["state"], json!("succeeded"));
        Ok(())
    }
}
