use std::time::Duration;

use anyhow::{Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, progress_percent, require_credential, response_json_or_error};
use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

const API_VERSION: &str = "2024-11-06";
const DEFAULT_MODEL: &str = "gen3a_turbo";

pub struct RunwayProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl RunwayProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Runway),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        let duration = request
            .options
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or(5);
        let mut payload = json!({
            "promptText": request.effective_prompt(),
            "model": request.option_str("model").unwrap_or(DEFAULT_MODEL),
            "duration": duration,
            "ratio": request.aspect_ratio("16:9"),
        });
        if let Some(image) = request.source_image.as_ref() {
            payload["promptImage"] = Value::String(image.to_data_url());
        }
        payload
    }

    fn parse_task(task: &Value) -> Result<JobStatus> {
        let status = task
            .get("status")
            .and_then(Value::as_str)
            .map(|value| value.to_ascii_uppercase())
            .unwrap_or_default();
        match status.as_str() {
            "SUCCEEDED" => {
                let artifact_url = first_string(task, &["/output/0", "/artifacts/0/url"])
                    .context("Runway task succeeded without an output URL")?;
                Ok(JobStatus::Succeeded { artifact_url })
            }
            "FAILED" | "CANCELLED" | "CANCELED" => Ok(JobStatus::Failed {
                message: first_string(task, &["/failure", "/failureCode"])
                    .unwrap_or_else(|| format!("Runway task {}", status.to_ascii_lowercase())),
            }),
            _ => Ok(JobStatus::Processing {
                progress: progress_percent(task.get("progress"), 100.0),
            }),
        }
    }
}

impl NamedProvider for RunwayProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Runway
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }
}

impl GenerationProvider for RunwayProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let endpoint = format!("{}/v1/image_to_video", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("X-Runway-Version", API_VERSION)
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Runway request failed ({endpoint})"))?;
        let payload = response_json_or_error("Runway", response)?;
        let job_id = first_string(&payload, &["/id"]).context("Runway response missing task id")?;
        Ok(Submission::Accepted { job_id })
    }

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        let api_key = require_credential(self.id(), query.credential)?;
        let endpoint = format!("{}/v1/tasks/{}", self.api_base, query.job_id);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(api_key)
            .header("X-Runway-Version", API_VERSION)
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Runway poll request failed ({endpoint})"))?;
        let task = response_json_or_error("Runway poll", response)?;
        Self::parse_task(&task)
    }
}
