use std::time::Duration;

use anyhow::{bail, Context, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::transport::{first_string, progress_percent, require_credential, response_json_or_error};
use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

const DEFAULT_MODEL: &str = "veo-001";

/// Google Veo through the Gemini API's long-running predict operations.
pub struct VeoProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl VeoProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Veo),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        format!("{}/models/{}:predict", self.api_base, trimmed)
    }

    fn operation_endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.api_base, operation.trim().trim_start_matches('/'))
    }

    fn build_payload(request: &GenerationRequest) -> Value {
        let duration = request
            .options
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or(5);
        let mut instance = json!({ "prompt": request.effective_prompt() });
        if let Some(image) = request.source_image.as_ref() {
            instance["image"] = json!({
                "bytesBase64Encoded": image.base64(),
                "mimeType": image.mime_type,
            });
        }
        json!({
            "instances": [instance],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": request.aspect_ratio("16:9"),
                "durationSeconds": duration,
            },
        })
    }

    fn parse_submission(payload: &Value) -> Result<Submission> {
        if let Some(encoded) = first_string(payload, &["/predictions/0/bytesBase64Encoded"]) {
            return Ok(Submission::Ready {
                artifact_url: format!("data:video/mp4;base64,{encoded}"),
            });
        }
        if let Some(job_id) =
            first_string(payload, &["/predictions/0/operationName", "/name"])
        {
            return Ok(Submission::Accepted { job_id });
        }
        bail!("Veo response contained neither a video nor an operation name")
    }

    fn parse_operation(operation: &Value) -> JobStatus {
        let done = operation
            .get("done")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !done {
            return JobStatus::Processing {
                progress: progress_percent(operation.pointer("/metadata/progressPercent"), 1.0),
            };
        }
        if let Some(error) = operation.get("error") {
            return JobStatus::Failed {
                message: first_string(error, &["/message"])
                    .unwrap_or_else(|| "Veo operation failed".to_string()),
            };
        }
        if let Some(encoded) =
            first_string(operation, &["/response/predictions/0/bytesBase64Encoded"])
        {
            return JobStatus::Succeeded {
                artifact_url: format!("data:video/mp4;base64,{encoded}"),
            };
        }
        match first_string(
            operation,
            &["/response/generateVideoResponse/generatedSamples/0/video/uri"],
        ) {
            Some(artifact_url) => JobStatus::Succeeded { artifact_url },
            None => JobStatus::Failed {
                message: "No video in completed operation".to_string(),
            },
        }
    }
}

impl NamedProvider for VeoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Veo
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }
}

impl GenerationProvider for VeoProvider {
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
            .with_context(|| format!("Veo request failed ({endpoint})"))?;
        let payload = response_json_or_error("Veo", response)?;
        Self::parse_submission(&payload)
    }

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        let api_key = require_credential(self.id(), query.credential)?;
        let endpoint = self.operation_endpoint(query.job_id);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Veo poll request failed ({endpoint})"))?;
        let operation = response_json_or_error("Veo poll", response)?;
        Ok(Self::parse_operation(&operation))
    }
}
