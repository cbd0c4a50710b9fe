use std::time::Duration;

use anyhow::{bail, Context, Result};
use mediagen_contracts::{data_url, GenerationRequest, MediaKind, NamedProvider, ProviderId};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::transport::{first_string, require_credential, response_json_or_error, truncate_text};
use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

/// Stable Video Diffusion image-to-video. Cannot run without a source image.
pub struct StabilityProvider {
    api_base: String,
    timeout: Duration,
    http: HttpClient,
}

impl StabilityProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base(ProviderId::Stability),
            timeout: config.request_timeout,
            http: HttpClient::new(),
        }
    }

    fn form_fields(request: &GenerationRequest) -> Vec<(&'static str, String)> {
        let field = |key: &str, default: &str| {
            request
                .options
                .get(key)
                .map(|value| match value {
                    Value::String(text) => text.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        vec![
            ("seed", field("seed", "0")),
            ("cfg_scale", field("cfg_scale", "1.8")),
            ("motion_bucket_id", field("motion_bucket_id", "127")),
        ]
    }

    fn file_name_for(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "image.jpg",
            "image/webp" => "image.webp",
            _ => "image.png",
        }
    }

    /// Result endpoint contract: 202 while rendering, 200 with the mp4 body once done.
    fn parse_result(
        status: StatusCode,
        content_type: Option<&str>,
        finish_reason: Option<&str>,
        body: &[u8],
    ) -> Result<JobStatus> {
        if status == StatusCode::ACCEPTED {
            return Ok(JobStatus::Processing { progress: None });
        }
        if !status.is_success() {
            bail!(
                "Stability poll request failed ({}): {}",
                status.as_u16(),
                truncate_text(&String::from_utf8_lossy(body), 512)
            );
        }
        if let Some(reason) = finish_reason.filter(|reason| !reason.eq_ignore_ascii_case("SUCCESS"))
        {
            return Ok(JobStatus::Failed {
                message: format!("Stability finished with {reason}"),
            });
        }
        let is_json = content_type
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);
        if is_json {
            let payload: Value = serde_json::from_slice(body)
                .context("Stability returned invalid JSON payload")?;
            let encoded = first_string(&payload, &["/video"])
                .context("Stability result missing video payload")?;
            return Ok(JobStatus::Succeeded {
                artifact_url: format!("data:video/mp4;base64,{encoded}"),
            });
        }
        if body.is_empty() {
            bail!("Stability result body was empty");
        }
        Ok(JobStatus::Succeeded {
            artifact_url: data_url("video/mp4", body),
        })
    }
}

impl NamedProvider for StabilityProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Stability
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }
}

impl GenerationProvider for StabilityProvider {
    fn submit(&self, request: &GenerationRequest, credential: Option<&str>) -> Result<Submission> {
        let api_key = require_credential(self.id(), credential)?;
        let Some(image) = request.source_image.as_ref() else {
            bail!("Stability image-to-video requires a source image");
        };
        let part = MultipartPart::bytes(image.bytes.clone())
            .file_name(Self::file_name_for(&image.mime_type))
            .mime_str(&image.mime_type)
            .context("Stability source image has an invalid mime type")?;
        let mut form = MultipartForm::new().part("image", part);
        for (key, value) in Self::form_fields(request) {
            form = form.text(key, value);
        }

        let endpoint = format!("{}/v2beta/image-to-video", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .with_context(|| format!("Stability request failed ({endpoint})"))?;
        let payload = response_json_or_error("Stability", response)?;
        let job_id =
            first_string(&payload, &["/id"]).context("Stability response missing generation id")?;
        Ok(Submission::Accepted { job_id })
    }

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        let api_key = require_credential(self.id(), query.credential)?;
        let endpoint = format!(
            "{}/v2beta/image-to-video/result/{}",
            self.api_base, query.job_id
        );
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(api_key)
            .header(ACCEPT, "video/*")
            .timeout(self.timeout)
            .send()
            .with_context(|| format!("Stability poll request failed ({endpoint})"))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let finish_reason = response
            .headers()
            .get("finish-reason")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .context("failed reading Stability result body")?;
        Self::parse_result(
            status,
            content_type.as_deref(),
            finish_reason.as_deref(),
            &body,
        )
    }
}
