use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::providers::ProviderId;

/// Source of per-provider credentials. Implementations never persist anything on behalf of
/// the workflow.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, provider: ProviderId) -> Option<String>;

    fn has_credential(&self, provider: ProviderId) -> bool {
        self.credential(provider).is_some()
    }
}

/// Reads credentials from the process environment on every lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credential(&self, provider: ProviderId) -> Option<String> {
        provider
            .credential_env_keys()
            .iter()
            .find_map(|key| non_empty_env(key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticCredentials {
    keys: BTreeMap<ProviderId, String>,
}

impl StaticCredentials {
    pub fn with(mut self, provider: ProviderId, credential: impl Into<String>) -> Self {
        self.insert(provider, credential);
        self
    }

    pub fn insert(&mut self, provider: ProviderId, credential: impl Into<String>) {
        let credential = credential.into().trim().to_string();
        if credential.is_empty() {
            self.keys.remove(&provider);
            return;
        }
        self.keys.insert(provider, credential);
    }

    /// Loads a JSON object mapping provider ids to credentials, e.g. `{"luma": "..."}`.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
        let parsed: BTreeMap<ProviderId, Option<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid credentials file {}", path.display()))?;
        let mut credentials = Self::default();
        for (provider, credential) in parsed {
            if let Some(credential) = credential {
                credentials.insert(provider, credential);
            }
        }
        Ok(credentials)
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.keys.keys().copied().collect()
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, provider: ProviderId) -> Option<String> {
        self.keys.get(&provider).cloned()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_count_as_absent() {
        let credentials = StaticCredentials::default()
            .with(ProviderId::Luma, "   ")
            .with(ProviderId::Runway, " rw-key ");
        assert!(!credentials.has_credential(ProviderId::Luma));
        assert_eq!(
            credentials.credential(ProviderId::Runway).as_deref(),
            Some("rw-key")
        );
    }

    #[test]
    fn json_file_maps_provider_ids() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("keys.json");
        fs::write(
            &path,
            r#"{"openai": "sk-1", "stability": null, "luma": ""}"#,
        )?;
        let credentials = StaticCredentials::from_json_file(&path)?;
        assert_eq!(credentials.providers(), vec![ProviderId::OpenAi]);
        Ok(())
    }

    #[test]
    fn json_file_rejects_unknown_providers() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("keys.json");
        fs::write(&path, r#"{"midjourney": "mj"}"#)?;
        assert!(StaticCredentials::from_json_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn placeholder_has_no_env_keys() {
        assert!(ProviderId::Placeholder.credential_env_keys().is_empty());
        assert!(!EnvCredentials.has_credential(ProviderId::Placeholder));
    }
}
