mod selection;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::request::MediaKind;

pub use selection::{ProviderSelection, ProviderSelector, SkippedProvider};

/// Every generation backend the workflow knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Imagen,
    Bhindi,
    Runway,
    Luma,
    Stability,
    Veo,
    Placeholder,
}

const IMAGE_PRIORITY: &[ProviderId] = &[
    ProviderId::OpenAi,
    ProviderId::Imagen,
    ProviderId::Bhindi,
    ProviderId::Placeholder,
];

const VIDEO_PRIORITY: &[ProviderId] = &[
    ProviderId::Runway,
    ProviderId::Luma,
    ProviderId::Stability,
    ProviderId::Veo,
    ProviderId::Placeholder,
];

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        ProviderId::OpenAi,
        ProviderId::Imagen,
        ProviderId::Bhindi,
        ProviderId::Runway,
        ProviderId::Luma,
        ProviderId::Stability,
        ProviderId::Veo,
        ProviderId::Placeholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Imagen => "imagen",
            Self::Bhindi => "bhindi",
            Self::Runway => "runway",
            Self::Luma => "luma",
            Self::Stability => "stability",
            Self::Veo => "veo",
            Self::Placeholder => "placeholder",
        }
    }

    pub fn supports(&self, kind: MediaKind) -> bool {
        match self {
            Self::OpenAi | Self::Imagen | Self::Bhindi => kind == MediaKind::Image,
            Self::Runway | Self::Luma | Self::Stability | Self::Veo => kind == MediaKind::Video,
            Self::Placeholder => true,
        }
    }

    /// Providers that cannot produce anything without a source image.
    pub fn requires_source_image(&self) -> bool {
        matches!(self, Self::Stability)
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, Self::Placeholder)
    }

    /// Environment keys consulted, in order, for this provider's credential.
    pub fn credential_env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Imagen => &["IMAGEN_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Bhindi => &["BHINDI_API_KEY"],
            Self::Runway => &["RUNWAY_API_KEY", "RUNWAYML_API_SECRET"],
            Self::Luma => &["LUMA_API_KEY", "LUMAAI_API_KEY"],
            Self::Stability => &["STABILITY_API_KEY"],
            Self::Veo => &["VEO_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Placeholder => &[],
        }
    }

    /// Fixed fallback order for a media kind; the placeholder is always last.
    pub fn priority(kind: MediaKind) -> &'static [ProviderId] {
        match kind {
            MediaKind::Image => IMAGE_PRIORITY,
            MediaKind::Video => VIDEO_PRIORITY,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let id = match normalized.as_str() {
            "openai" | "dall-e-3" | "dalle" => Self::OpenAi,
            "imagen" | "google-gemini" | "gemini" => Self::Imagen,
            "bhindi" => Self::Bhindi,
            "runway" => Self::Runway,
            "luma" => Self::Luma,
            "stability" => Self::Stability,
            "veo" | "google-veo" => Self::Veo,
            "placeholder" | "free-tier" => Self::Placeholder,
            _ => return Err(format!("unknown provider '{}'", raw.trim())),
        };
        Ok(id)
    }
}

pub trait NamedProvider {
    fn id(&self) -> ProviderId;
    fn media_kind(&self) -> MediaKind;
}

impl<T: NamedProvider + ?Sized> NamedProvider for Box<T> {
    fn id(&self) -> ProviderId {
        (**self).id()
    }

    fn media_kind(&self) -> MediaKind {
        (**self).media_kind()
    }
}

/// Ordered set of provider adapters. Registration order is kept; lookups are by id and kind
/// because the placeholder serves both media kinds.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn register(&mut self, provider: T) {
        self.providers.retain(|existing| {
            existing.id() != provider.id() || existing.media_kind() != provider.media_kind()
        });
        self.providers.push(provider);
    }

    pub fn get(&self, id: ProviderId, kind: MediaKind) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.id() == id && provider.media_kind() == kind)
    }

    pub fn contains(&self, id: ProviderId, kind: MediaKind) -> bool {
        self.get(id, kind).is_some()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| format!("{}:{}", provider.id(), provider.media_kind()))
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}
