mod config;
mod dispatcher;
mod poller;
mod providers;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::{bail, Result};
use mediagen_contracts::{GenerationRequest, NamedProvider, PollPolicy, ProviderRegistry};

pub use config::EngineConfig;
pub use dispatcher::{Dispatch, Dispatcher};
pub use poller::CompletionPoller;
pub use providers::{
    BhindiProvider, ImagenProvider, LumaProvider, OpenAiProvider, PlaceholderImageProvider,
    PlaceholderVideoProvider, RunwayProvider, StabilityProvider, VeoProvider,
    PLACEHOLDER_READY_AFTER, PLACEHOLDER_READY_DELAY, PLACEHOLDER_VIDEO_URL,
};

/// What a provider handed back from a submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Ready { artifact_url: String },
    Accepted { job_id: String },
}

/// Provider-reported state of an asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Processing { progress: Option<u8> },
    Succeeded { artifact_url: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy)]
pub struct StatusQuery<'a> {
    pub job_id: &'a str,
    pub credential: Option<&'a str>,
    /// 1-based count of status queries issued for this job, including this one.
    pub attempt: u32,
}

/// Adapter between the workflow and one provider's HTTP contract.
pub trait GenerationProvider: NamedProvider + Send + Sync {
    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::for_provider(self.id())
    }

    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission>;

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        bail!(
            "provider '{}' does not run asynchronous jobs (job {})",
            self.id(),
            query.job_id
        )
    }
}

pub type ProviderChain = ProviderRegistry<Box<dyn GenerationProvider>>;

/// Every built-in adapter, image chain first, each chain ending in its placeholder.
pub fn default_provider_registry(config: &EngineConfig) -> ProviderChain {
    let mut providers: ProviderChain = ProviderRegistry::default();
    providers.register(Box::new(OpenAiProvider::new(config)));
    providers.register(Box::new(ImagenProvider::new(config)));
    providers.register(Box::new(BhindiProvider::new(config)));
    providers.register(Box::new(PlaceholderImageProvider));
    providers.register(Box::new(RunwayProvider::new(config)));
    providers.register(Box::new(LumaProvider::new(config)));
    providers.register(Box::new(StabilityProvider::new(config)));
    providers.register(Box::new(VeoProvider::new(config)));
    providers.register(Box::new(PlaceholderVideoProvider));
    providers
}

#[cfg(test)]
mod tests {
    use mediagen_contracts::{MediaKind, ProviderId};

    use super::*;

    #[test]
    fn default_registry_covers_every_priority_entry() {
        let providers = default_provider_registry(&EngineConfig::default());
        for kind in [MediaKind::Image, MediaKind::Video] {
            for id in ProviderId::priority(kind) {
                assert!(providers.contains(*id, kind), "missing {id}:{kind}");
            }
        }
        assert_eq!(providers.providers().len(), 9);
    }

    #[test]
    fn synchronous_providers_reject_status_queries() {
        let provider = PlaceholderImageProvider;
        let query = StatusQuery {
            job_id: "nothing",
            credential: None,
            attempt: 1,
        };
        assert!(provider.status(&query).is_err());
    }
}
