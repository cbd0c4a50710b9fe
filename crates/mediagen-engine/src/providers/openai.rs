use std::time::Duration;

use anyhow::{Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, require_credential, response_json_or_error};
use crate::{GenerationProvider, Submission};

const DEFAULT_MODEL: &str = "dall-e-3";

pub struct OpenAiProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::OpenAi),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base)
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        json!({
            "model": request.option_str("model").unwrap_or(DEFAULT_MODEL),
            "prompt": request.effective_prompt(),
            "n": 1,
            "size": request.option_str("size").unwrap_or("1024x1024"),
            "quality": request.option_str("quality").unwrap_or("hd"),
            "style": request.option_str("style").unwrap_or("vivid"),
        })
    }

    fn extract_artifact(payload: &Value) -> Option<String> {
        if let Some(url) = first_string(payload, &["/data/0/url"]) {
            return Some(url);
        }
        first_string(payload, &["/data/0/b64_json"])
            .map(|encoded| format!("data:image/png;base64,{encoded}"))
    }
}

impl NamedProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }
}

impl GenerationProvider for OpenAiProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let payload = response_json_or_error("OpenAI", response)?;
        let artifact_url = Self::extract_artifact(&payload)
            .context("OpenAI response returned no image")?;
        Ok(Submission::Ready { artifact_url })
    }
}
