use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mediagen_contracts::{data_url, GenerationRequest, MediaKind, NamedProvider, ProviderId};
use sha2::{Digest, Sha256};

use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

/// Big Buck Bunny (9m56s, with audio); served for every placeholder video job.
pub const PLACEHOLDER_VIDEO_URL: &str =
    "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4";

/// Status query on which a placeholder video job reports success.
pub const PLACEHOLDER_READY_AFTER: u32 = 2;

/// Age at which a placeholder job is done regardless of the attempt number, so a
/// standalone `poll` of an old job id completes.
pub const PLACEHOLDER_READY_DELAY: Duration = Duration::from_secs(4);

const JOB_PREFIX: &str = "placeholder-";
const MAX_SWATCH_EDGE: u32 = 512;

/// Network-free image fallback: a solid PNG swatch coloured from the prompt hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderImageProvider;

impl PlaceholderImageProvider {
    fn render(prompt: &str, size: Option<&str>) -> Result<Vec<u8>> {
        let (width, height) = size.map(parse_dims).unwrap_or((MAX_SWATCH_EDGE, MAX_SWATCH_EDGE));
        let (width, height) = (width.min(MAX_SWATCH_EDGE), height.min(MAX_SWATCH_EDGE));
        let (r, g, b) = color_from_prompt(prompt);
        let mut swatch = RgbImage::new(width, height);
        for pixel in swatch.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(swatch)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("failed to encode placeholder image")?;
        Ok(bytes)
    }
}

impl NamedProvider for PlaceholderImageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Placeholder
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Image
    }
}

impl GenerationProvider for PlaceholderImageProvider {
    fn submit(&self, request: &GenerationRequest, _credential: Option<&str>) -> Result<Submission> {
        let bytes = Self::render(request.effective_prompt(), request.option_str("size"))?;
        Ok(Submission::Ready {
            artifact_url: data_url("image/png", &bytes),
        })
    }
}

/// Network-free video fallback: issues a synthetic job that completes on a fixed poll or
/// once its issue time is [`PLACEHOLDER_READY_DELAY`] in the past.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderVideoProvider;

impl NamedProvider for PlaceholderVideoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Placeholder
    }

    fn media_kind(&self) -> MediaKind {
        MediaKind::Video
    }
}

impl GenerationProvider for PlaceholderVideoProvider {
    fn submit(&self, _request: &GenerationRequest, _credential: Option<&str>) -> Result<Submission> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Ok(Submission::Accepted {
            job_id: format!("{JOB_PREFIX}{stamp}-{}", &suffix[..9]),
        })
    }

    fn status(&self, query: &StatusQuery<'_>) -> Result<JobStatus> {
        if !query.job_id.starts_with(JOB_PREFIX) {
            return Ok(JobStatus::Failed {
                message: format!("unknown placeholder job '{}'", query.job_id),
            });
        }
        let aged = issued_at_millis(query.job_id)
            .map(|issued| chrono::Utc::now().timestamp_millis().saturating_sub(issued))
            .is_some_and(|age| age >= PLACEHOLDER_READY_DELAY.as_millis() as i64);
        if aged || query.attempt >= PLACEHOLDER_READY_AFTER {
            return Ok(JobStatus::Succeeded {
                artifact_url: PLACEHOLDER_VIDEO_URL.to_string(),
            });
        }
        let progress = (query.attempt.saturating_mul(100) / PLACEHOLDER_READY_AFTER).min(95) as u8;
        Ok(JobStatus::Processing {
            progress: Some(progress),
        })
    }
}

fn issued_at_millis(job_id: &str) -> Option<i64> {
    let rest = job_id.strip_prefix(JOB_PREFIX)?;
    let (stamp, _) = rest.split_once('-')?;
    stamp.parse().ok()
}

fn parse_dims(size: &str) -> (u32, u32) {
    let raw = size.trim().to_ascii_lowercase();
    if let Some((w, h)) = raw.split_once('x') {
        let width = w.trim().parse::<u32>().unwrap_or(MAX_SWATCH_EDGE);
        let height = h.trim().parse::<u32>().unwrap_or(MAX_SWATCH_EDGE);
        return (width.max(1), height.max(1));
    }
    (MAX_SWATCH_EDGE, MAX_SWATCH_EDGE)
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}
