use crate::credentials::CredentialProvider;
use crate::errors::{ErrorKind, GenerationError};
use crate::request::GenerationRequest;

use super::ProviderId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProvider {
    pub provider: ProviderId,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub requested: Option<ProviderId>,
    /// Eligible providers in the order they should be attempted.
    pub candidates: Vec<ProviderId>,
    pub skipped: Vec<SkippedProvider>,
    pub fallback_reason: Option<String>,
}

/// Orders the fallback chain for one request against the credentials available right now.
pub struct ProviderSelector<'a> {
    credentials: &'a dyn CredentialProvider,
}

impl<'a> ProviderSelector<'a> {
    pub fn new(credentials: &'a dyn CredentialProvider) -> Self {
        Self { credentials }
    }

    pub fn select(&self, request: &GenerationRequest) -> Result<ProviderSelection, GenerationError> {
        request.validate()?;
        let kind = request.media_kind;
        let requested = request.provider_preference;

        let mut order: Vec<ProviderId> = Vec::new();
        if let Some(preferred) = requested {
            order.push(preferred);
        }
        for id in ProviderId::priority(kind) {
            if !order.contains(id) {
                order.push(*id);
            }
        }

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        for id in order {
            if id.requires_source_image() && request.source_image.is_none() {
                skipped.push(SkippedProvider {
                    provider: id,
                    kind: ErrorKind::RequestInvalid,
                    reason: format!("Provider '{id}' requires a source image."),
                });
                continue;
            }
            if id.requires_credential() && !self.credentials.has_credential(id) {
                skipped.push(SkippedProvider {
                    provider: id,
                    kind: ErrorKind::ProviderUnavailable,
                    reason: format!("Provider '{id}' has no credential configured."),
                });
                continue;
            }
            candidates.push(id);
        }

        let fallback_reason = match requested {
            Some(preferred) if candidates.first() == Some(&preferred) => None,
            Some(preferred) => Some(format!(
                "Requested provider '{preferred}' unavailable for {kind}; using fallback chain."
            )),
            None => Some("No provider specified; using priority order.".to_string()),
        };

        Ok(ProviderSelection {
            requested,
            candidates,
            skipped,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::credentials::StaticCredentials;
    use crate::request::{GenerationRequest, SourceImage};

    use super::*;

    fn png_source() -> SourceImage {
        SourceImage::new(vec![0x89, b'P', b'N', b'G'], "image/png")
    }

    #[test]
    fn preferred_provider_with_credential_goes_first() -> anyhow::Result<()> {
        let credentials = StaticCredentials::default()
            .with(ProviderId::OpenAi, "sk-openai")
            .with(ProviderId::Bhindi, "bh-key");
        let request = GenerationRequest::image("a lighthouse").with_provider(ProviderId::Bhindi);
        let selection = ProviderSelector::new(&credentials).select(&request)?;
        assert_eq!(
            selection.candidates,
            vec![ProviderId::Bhindi, ProviderId::OpenAi, ProviderId::Placeholder]
        );
        assert_eq!(selection.fallback_reason, None);
        assert_eq!(selection.requested, Some(ProviderId::Bhindi));
        Ok(())
    }

    #[test]
    fn missing_credentials_leave_only_placeholder() -> anyhow::Result<()> {
        let credentials = StaticCredentials::default();
        let request = GenerationRequest::image("a lighthouse").with_provider(ProviderId::OpenAi);
        let selection = ProviderSelector::new(&credentials).select(&request)?;
        assert_eq!(selection.candidates, vec![ProviderId::Placeholder]);
        assert!(selection
            .skipped
            .iter()
            .all(|skip| skip.kind == ErrorKind::ProviderUnavailable));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested provider 'openai' unavailable for image; using fallback chain.")
        );
        Ok(())
    }

    #[test]
    fn no_preference_uses_priority_order() -> anyhow::Result<()> {
        let credentials = StaticCredentials::default()
            .with(ProviderId::Veo, "veo-key")
            .with(ProviderId::Luma, "luma-key");
        let request = GenerationRequest::video("waves at dusk");
        let selection = ProviderSelector::new(&credentials).select(&request)?;
        assert_eq!(
            selection.candidates,
            vec![ProviderId::Luma, ProviderId::Veo, ProviderId::Placeholder]
        );
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No provider specified; using priority order.")
        );
        Ok(())
    }

    #[test]
    fn image_only_provider_is_skipped_in_text_to_video_fallback() -> anyhow::Result<()> {
        let credentials = StaticCredentials::default().with(ProviderId::Stability, "st-key");
        let request = GenerationRequest::video("waves at dusk");
        let selection = ProviderSelector::new(&credentials).select(&request)?;
        assert_eq!(selection.candidates, vec![ProviderId::Placeholder]);
        assert!(selection.skipped.iter().any(|skip| {
            skip.provider == ProviderId::Stability && skip.kind == ErrorKind::RequestInvalid
        }));

        let with_image = GenerationRequest::video("").with_source_image(png_source());
        let selection = ProviderSelector::new(&credentials).select(&with_image)?;
        assert_eq!(
            selection.candidates,
            vec![ProviderId::Stability, ProviderId::Placeholder]
        );
        Ok(())
    }

    #[test]
    fn preferred_image_only_provider_without_image_is_rejected() {
        let credentials = StaticCredentials::default().with(ProviderId::Stability, "st-key");
        let request = GenerationRequest::video("waves").with_provider(ProviderId::Stability);
        let err = ProviderSelector::new(&credentials)
            .select(&request)
            .err()
            .map(|err| err.kind());
        assert_eq!(err, Some(ErrorKind::RequestInvalid));
    }
}
