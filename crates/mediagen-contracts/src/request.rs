use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::artifacts::{data_url, parse_data_url};
use crate::errors::GenerationError;
use crate::providers::ProviderId;

pub const DEFAULT_ANIMATE_PROMPT: &str = "Animate this image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    TextToVideo,
    ImageToVideo,
}

/// Caller-supplied image bytes used as the first frame or reference for video providers.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Accepts `data:<mime>;base64,<payload>`; anything else is a request error.
    pub fn from_data_url(raw: &str) -> Result<Self, GenerationError> {
        let (mime_type, bytes) = parse_data_url(raw).map_err(GenerationError::invalid)?;
        if !mime_type.starts_with("image/") {
            return Err(GenerationError::invalid(format!(
                "source image must be an image, got '{mime_type}'"
            )));
        }
        if bytes.is_empty() {
            return Err(GenerationError::invalid("source image is empty"));
        }
        Ok(Self::new(bytes, mime_type))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        if bytes.is_empty() {
            anyhow::bail!("source image {} is empty", path.display());
        }
        let mime_type = mime_for_path(path).unwrap_or("image/png");
        Ok(Self::new(bytes, mime_type))
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        data_url(&self.mime_type, &self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub media_kind: MediaKind,
    pub prompt: String,
    pub source_image: Option<SourceImage>,
    pub provider_preference: Option<ProviderId>,
    /// Provider-specific knobs (`size`, `style`, `aspect_ratio`, ...) passed through untouched.
    pub options: Map<String, Value>,
}

impl GenerationRequest {
    pub fn new(media_kind: MediaKind, prompt: impl Into<String>) -> Self {
        Self {
            media_kind,
            prompt: prompt.into(),
            source_image: None,
            provider_preference: None,
            options: Map::new(),
        }
    }

    pub fn image(prompt: impl Into<String>) -> Self {
        Self::new(MediaKind::Image, prompt)
    }

    pub fn video(prompt: impl Into<String>) -> Self {
        Self::new(MediaKind::Video, prompt)
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider_preference = Some(provider);
        self
    }

    pub fn with_source_image(mut self, image: SourceImage) -> Self {
        self.source_image = Some(image);
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn mode(&self) -> VideoMode {
        if self.source_image.is_some() {
            VideoMode::ImageToVideo
        } else {
            VideoMode::TextToVideo
        }
    }

    /// Prompt sent to providers; image-to-video without text animates the image as-is.
    pub fn effective_prompt(&self) -> &str {
        let trimmed = self.prompt.trim();
        if trimmed.is_empty() && self.media_kind == MediaKind::Video {
            return DEFAULT_ANIMATE_PROMPT;
        }
        trimmed
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Aspect ratio from an explicit `aspect_ratio` option, else derived from `size`.
    pub fn aspect_ratio(&self, default: &str) -> String {
        if let Some(ratio) = self.option_str("aspect_ratio") {
            return ratio.replace('/', ":");
        }
        match self.option_str("size") {
            Some("1792x1024") => "16:9".to_string(),
            Some("1024x1792") => "9:16".to_string(),
            Some(_) => "1:1".to_string(),
            None => default.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        let has_prompt = !self.prompt.trim().is_empty();
        match self.media_kind {
            MediaKind::Image if !has_prompt => {
                return Err(GenerationError::invalid("Prompt is required"));
            }
            MediaKind::Video if !has_prompt && self.source_image.is_none() => {
                return Err(GenerationError::invalid("Prompt or image is required"));
            }
            _ => {}
        }
        if let Some(provider) = self.provider_preference {
            if !provider.supports(self.media_kind) {
                return Err(GenerationError::invalid(format!(
                    "Provider '{provider}' does not generate {}",
                    self.media_kind
                )));
            }
            if provider.requires_source_image() && self.source_image.is_none() {
                return Err(GenerationError::invalid(format!(
                    "Provider '{provider}' requires a source image for {} generation",
                    self.media_kind
                )));
            }
        }
        Ok(())
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
