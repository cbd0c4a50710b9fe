use std::time::Duration;

use anyhow::{Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, require_credential, response_json_or_error};
use crate::{GenerationProvider, Submission};

const DEFAULT_MODEL: &str = "imagen-3.0-generate-001";

pub struct ImagenProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl ImagenProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Imagen),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        format!("{}/models/{}:predict", self.api_base, trimmed)
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        json!({
            "instances": [{ "prompt": request.effective_prompt() }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": request.aspect_ratio("1:1"),
                "safetySetting": "block_some",
                "personGeneration": "allow_adult",
            },
        })
    }

    fn extract_artifact(payload: &Value) -> Option<String> {
        let encoded = first_string(payload, &["/predictions/0/bytesBase64Encoded"])?;
        let mime = first_string(payload, &["/predictions/0/mimeType"])
            .unwrap_or_else(|| "image/png".to_string());
        Some(format!("data:{mime};base64,{encoded}"))
    }
}

impl NamedProvider for ImagenProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Imagen
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }
}

impl GenerationProvider for ImagenProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let endpoint =
            self.endpoint_for_model(request.option_str("model").unwrap_or(DEFAULT_MODEL));
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Imagen request failed ({endpoint})"))?;
        let payload = response_json_or_error("Imagen", response)?;
        let artifact_url =
            Self::extract_artifact(&payload).context("Imagen response returned no image")?;
        Ok(Submission::Ready { artifact_url })
    }
}
