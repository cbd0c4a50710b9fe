use std::time::Duration;

use anyhow::{Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, require_credential, response_json_or_error};
use crate::{GenerationProvider, Submission};

const MODEL: &str = "gemini-nano-banana-pro";

/// Gemini image generation proxied through the Bhindi API.
pub struct BhindiProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl BhindiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Bhindi),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        json!({
            "prompt": request.effective_prompt(),
            "aspectRatio": request.aspect_ratio("1:1"),
            "model": MODEL,
        })
    }

    fn extract_artifact(payload: &Value) -> Option<String> {
        first_string(
            payload,
            &["/imageUrl", "/url", "/data/url", "/data/0/url"],
        )
    }
}

impl NamedProvider for BhindiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Bhindi
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }
}

impl GenerationProvider for BhindiProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let endpoint = format!("{}/v1/image/generate", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Bhindi request failed ({endpoint})"))?;
        let payload = response_json_or_error("Bhindi", response)?;
        let artifact_url =
            Self::extract_artifact(&payload).context("Bhindi response returned no image URL")?;
        Ok(Submission::Ready { artifact_url })
    }
}
