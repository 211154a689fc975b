use crate::error::ConfigError;
use crate::stores::qdrant::DEFAULT_QDRANT_URL;
use serde::Deserialize;
use std::path::Path;

/// Credentials and endpoints read from the secrets TOML file:
///
/// ```toml
/// [openai]
/// OPENAI_API_KEY = "sk-..."
///
/// [qdrant]
/// QDRANT_URL = "http://localhost:6333"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openai: OpenAiSecrets,
    #[serde(default)]
    pub qdrant: QdrantSecrets,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiSecrets {
    #[serde(rename = "OPENAI_API_KEY")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QdrantSecrets {
    #[serde(rename = "QDRANT_URL")]
    pub url: Option<String>,
}

impl Secrets {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Like [`Secrets::load`], but a missing file yields empty secrets.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no secrets file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn qdrant_url(&self) -> &str {
        self.qdrant.url.as_deref().unwrap_or(DEFAULT_QDRANT_URL)
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("openai.OPENAI_API_KEY".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_both_sections() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("secrets.toml");
        std::fs::write(
            &path,
            "[openai]\nOPENAI_API_KEY = \"sk-test\"\n\n[qdrant]\nQDRANT_URL = \"http://qdrant:6333\"\n",
        )?;

        let secrets = Secrets::load(&path)?;

        assert_eq!(secrets.require_api_key()?, "sk-test");
        assert_eq!(secrets.qdrant_url(), "http://qdrant:6333");
        Ok(())
    }

    #[test]
    fn missing_file_falls_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let secrets = Secrets::load_or_default(&dir.path().join("absent.toml"))?;

        assert_eq!(secrets.qdrant_url(), DEFAULT_QDRANT_URL);
        assert!(matches!(secrets.require_api_key(), Err(ConfigError::Missing(_))));
        assert!(matches!(
            Secrets::load(&dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
        Ok(())
    }

    #[test]
    fn malformed_toml_is_reported() {
        let result = Secrets::parse("[openai\n", Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Toml { path, .. }) if path == "bad.toml"));
    }
}
