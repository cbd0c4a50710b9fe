use std::time::Duration;

use anyhow::{bail, Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, require_credential, response_json_or_error};
use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

/// Luma Dream Machine generations.
pub struct LumaProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl LumaProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Luma),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn generations_endpoint(&self) -> String {
        format!("{}/dream-machine/v1/generations", self.api_base)
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        let looped = request
            .options
            .get("loop")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut payload = json!({
            "prompt": request.effective_prompt(),
            "aspect_ratio": request.aspect_ratio("16:9"),
            "loop": looped,
        });
        if let Some(image) = request.source_image.as_ref() {
            payload["keyframes"] = json!({
                "frame0": { "type": "image", "url": image.to_data_url() }
            });
        }
        payload
    }

    fn parse_generation(generation: &Value) -> JobStatus {
        let state = generation
            .get("state")
            .and_then(Value::as_str)
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        match state.as_str() {
            "completed" => match first_string(generation, &["/assets/video", "/video/url"]) {
                Some(artifact_url) => JobStatus::Succeeded { artifact_url },
                None => JobStatus::Failed {
                    message: "Luma generation completed without a video asset".to_string(),
                },
            },
            "failed" => JobStatus::Failed {
                message: first_string(generation, &["/failure_reason"])
                    .unwrap_or_else(|| "Luma generation failed".to_string()),
            },
            _ => JobStatus::Processing { progress: None },
        }
    }
}

impl NamedProvider for LumaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Luma
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }
}

impl GenerationProvider for LumaProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let endpoint = self.generations_endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Luma request failed ({endpoint})"))?;
        let payload = response_json_or_error("Luma", response)?;
        match Self::parse_generation(&payload) {
            JobStatus::Succeeded { artifact_url } => return Ok(Submission::Ready { artifact_url }),
            JobStatus::Failed { message } => bail!("Luma rejected the generation: {message}"),
            JobStatus::Processing { .. } => {}
        }
        let job_id =
            first_string(&payload, &["/id"]).context("Luma response missing generation id")?;
        Ok(Submission::Accepted { job_id })
    }

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        let api_key = require_credential(self.id(), query.credential)?;
        let endpoint = format!("{}/{}", self.generations_endpoint(), query.job_id);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Luma poll request failed ({endpoint})"))?;
        let generation = response_json_or_error("Luma poll", response)?;
        Ok(Self::parse_generation(&generation))
    }
}

#[cfg(test)]
mod tests {
    use mediagen_contracts::SourceImage;

    use super::*;

    #[test]
    fn payload_uses_first_keyframe_for_source_image() {
        let request = GenerationRequest::video("a heron lifts off")
            .with_source_image(SourceImage::new(vec![9, 9], "image/jpeg"));
        let payload = LumaProvider::build_payload(&request);
        assert_eq!(payload["aspect_ratio"], json!("16:9"));
        assert_eq!(payload["loop"], json!(false));
        assert_eq!(payload["keyframes"]["frame0"]["type"], json!("image"));
        assert_eq!(
            payload["keyframes"]["frame0"]["url"],
            json!("data:image/jpeg;base64,CQk=")
        );
    }

    #[test]
    fn generation_states_map_to_job_status() {
        assert_eq!(
            LumaProvider::parse_generation(&json!({"id": "g1", "state": "dreaming"})),
            JobStatus::Processing { progress: None }
        );
        assert_eq!(
            LumaProvider::parse_generation(
                &json!({"state": "completed", "assets": {"video": "https://storage.cdn-luma.com/v.mp4"}})
            ),
            JobStatus::Succeeded {
                artifact_url: "https://storage.cdn-luma.com/v.mp4".to_string()
            }
        );
        assert_eq!(
            LumaProvider::parse_generation(&json!({"state": "failed", "failure_reason": "nsfw"})),
            JobStatus::Failed {
                message: "nsfw".to_string()
            }
        );
        assert!(matches!(
            LumaProvider::parse_generation(&json!({"state": "completed", "assets": {}})),
            JobStatus::Failed { .. }
        ));
    }
}
