use anyhow::{anyhow, bail, Result};
use mediagen_contracts::{
    validate_artifact_url, CredentialProvider, ErrorKind, EventPayload, EventWriter,
    GenerationError, GenerationEvent, GenerationRequest, GenerationStatus, JobHandle, MediaKind,
    ProviderId, ProviderResult, ProviderSelector,
};
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::poller::CompletionPoller;
use crate::transport::error_chain_text;
use crate::{default_provider_registry, GenerationProvider, ProviderChain, Submission};

/// Outcome of one dispatch: the winning result plus how the chain got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub result: ProviderResult,
    pub requested: Option<ProviderId>,
    pub fallback_reason: Option<String>,
    /// Every provider actually called, in order; failures carry their message.
    pub attempts: Vec<ProviderResult>,
}

impl Dispatch {
    pub fn status(&self) -> GenerationStatus {
        GenerationStatus::from_provider_result(&self.result, self.fallback_reason.clone())
    }

    pub fn job(&self) -> Option<&JobHandle> {
        match &self.result {
            ProviderResult::Pending(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Routes generation requests through the provider fallback chain.
pub struct Dispatcher {
    providers: ProviderChain,
    events: Option<EventWriter>,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_providers(default_provider_registry(config))
    }

    pub fn with_providers(providers: ProviderChain) -> Self {
        Self {
            providers,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn providers(&self) -> &ProviderChain {
        &self.providers
    }

    pub fn dispatch(
        &self,
        request: &GenerationRequest,
        credentials: &dyn CredentialProvider,
    ) -> Result<Dispatch, GenerationError> {
        let selection = ProviderSelector::new(credentials).select(request)?;
        let kind = request.media_kind;
        tracing::info!(
            media_kind = %kind,
            requested = ?selection.requested,
            candidates = ?selection.candidates,
            "dispatching generation request"
        );
        self.emit(
            GenerationEvent::DispatchStarted,
            json!({
                "media_kind": kind,
                "mode": request.mode(),
                "requested": selection.requested,
                "candidates": selection.candidates,
            }),
        );
        for skipped in &selection.skipped {
            tracing::debug!(provider = %skipped.provider, reason = %skipped.reason, "provider skipped");
            self.emit(
                GenerationEvent::ProviderSkipped,
                json!({
                    "provider": skipped.provider,
                    "error_kind": skipped.kind,
                    "reason": skipped.reason,
                }),
            );
        }

        let mut fallback_reason = selection.fallback_reason;
        let mut attempts = Vec::new();
        for provider_id in selection.candidates {
            let Some(provider) = self.providers.get(provider_id, kind) else {
                fallback_reason = append_fallback_reason(
                    fallback_reason,
                    format!("Provider '{provider_id}' has no registered {kind} adapter."),
                );
                continue;
            };
            let credential = credentials.credential(provider_id);
            match submit_to(provider.as_ref(), request, credential.as_deref()) {
                Ok(result) => {
                    tracing::info!(provider = %provider_id, "provider accepted request");
                    self.emit(
                        GenerationEvent::DispatchCompleted,
                        json!({
                            "provider": provider_id,
                            "pending": matches!(result, ProviderResult::Pending(_)),
                            "fallback_reason": fallback_reason,
                        }),
                    );
                    attempts.push(result.clone());
                    return Ok(Dispatch {
                        result,
                        requested: selection.requested,
                        fallback_reason,
                        attempts,
                    });
                }
                Err(err) => {
                    let message = error_chain_text(&err, 600);
                    tracing::warn!(provider = %provider_id, error = %message, "provider failed; trying next");
                    self.emit(
                        GenerationEvent::ProviderFailed,
                        json!({
                            "provider": provider_id,
                            "error_kind": ErrorKind::ProviderError,
                            "message": message,
                        }),
                    );
                    fallback_reason = append_fallback_reason(
                        fallback_reason,
                        format!("Provider '{provider_id}' failed: {message}."),
                    );
                    attempts.push(ProviderResult::Failed {
                        provider: provider_id,
                        error: ErrorKind::ProviderError,
                        message,
                    });
                }
            }
        }

        Err(GenerationError::ProvidersExhausted(
            fallback_reason.unwrap_or_else(|| format!("no {kind} providers available")),
        ))
    }

    /// Poller for a handle issued by this dispatcher, or one carried in from elsewhere.
    pub fn poller<'a>(
        &'a self,
        handle: JobHandle,
        credentials: &'a dyn CredentialProvider,
    ) -> CompletionPoller<'a> {
        let provider = self
            .providers
            .get(handle.provider, MediaKind::Video)
            .map(|provider| provider.as_ref());
        CompletionPoller::new(provider, credentials, handle, self.events.clone())
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

fn submit_to(
    provider: &dyn GenerationProvider,
    request: &GenerationRequest,
    credential: Option<&str>,
) -> Result<ProviderResult> {
    let provider_id = provider.id();
    match provider.submit(request, credential)? {
        Submission::Ready { artifact_url } => {
            validate_artifact_url(&artifact_url).map_err(|reason| {
                anyhow!("{provider_id} returned an unusable artifact URL: {reason}")
            })?;
            Ok(ProviderResult::Immediate {
                provider: provider_id,
                artifact_url,
            })
        }
        Submission::Accepted { job_id } => {
            let job_id = job_id.trim();
            if job_id.is_empty() {
                bail!("{provider_id} accepted the request without a job id");
            }
            Ok(ProviderResult::Pending(JobHandle::new(job_id, provider_id)))
        }
    }
}

pub(crate) fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}

fn append_fallback_reason(existing: Option<String>, reason: String) -> Option<String> {
    if reason.trim().is_empty() {
        return existing;
    }
    match existing {
        Some(previous) if !previous.trim().is_empty() => Some(format!("{previous} {reason}")),
        _ => Some(reason),
    }
}
