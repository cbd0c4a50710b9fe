use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use mediagen_contracts::ProviderId;

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 60.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 5.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

/// Transport settings shared by every adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Upper bound for a single outbound call; independent of any poll budget.
    pub request_timeout: Duration,
    api_bases: BTreeMap<ProviderId, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
            api_bases: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(timeout) = env::var("MEDIAGEN_REQUEST_TIMEOUT")
            .ok()
            .and_then(|raw| parse_request_timeout(&raw))
        {
            config.request_timeout = timeout;
        }
        for id in ProviderId::ALL {
            let Some(key) = api_base_env_key(id) else {
                continue;
            };
            if let Ok(raw) = env::var(key) {
                config.set_api_base(id, &raw);
            }
        }
        config
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_api_base(mut self, provider: ProviderId, base: &str) -> Self {
        self.set_api_base(provider, base);
        self
    }

    fn set_api_base(&mut self, provider: ProviderId, base: &str) {
        let normalized = base.trim().trim_end_matches('/');
        if normalized.is_empty() {
            self.api_bases.remove(&provider);
            return;
        }
        self.api_bases.insert(provider, normalized.to_string());
    }

    pub fn api_base(&self, provider: ProviderId) -> String {
        self.api_bases
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| default_api_base(provider).to_string())
    }
}

/// Seconds from `MEDIAGEN_REQUEST_TIMEOUT`, clamped to 5..=300.
fn parse_request_timeout(raw: &str) -> Option<Duration> {
    let seconds = raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(Duration::from_secs_f64(
        seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S),
    ))
}

fn api_base_env_key(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::OpenAi => Some("OPENAI_API_BASE"),
        ProviderId::Imagen => Some("IMAGEN_API_BASE"),
        ProviderId::Bhindi => Some("BHINDI_API_URL"),
        ProviderId::Runway => Some("RUNWAY_API_BASE"),
        ProviderId::Luma => Some("LUMA_API_BASE"),
        ProviderId::Stability => Some("STABILITY_API_BASE"),
        ProviderId::Veo => Some("VEO_API_BASE"),
        ProviderId::Placeholder => None,
    }
}

fn default_api_base(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::OpenAi => "https://api.openai.com/v1",
        ProviderId::Imagen | ProviderId::Veo => "https://generativelanguage.googleapis.com/v1beta",
        ProviderId::Bhindi => "https://api.bhindi.io",
        ProviderId::Runway => "https://api.runwayml.com",
        ProviderId::Luma => "https://api.lumalabs.ai",
        ProviderId::Stability => "https://api.stability.ai",
        ProviderId::Placeholder => "",
    }
}
