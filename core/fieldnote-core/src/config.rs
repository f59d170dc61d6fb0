//! Daemon configuration, loaded from `~/.fieldnote/config.toml`.
//!
//! Every field has a serde default so a missing or partial file still
//! yields a usable config. The API key is resolved from the
//! `FIELDNOTE_API_KEY` environment variable first, then the file.

use serde::Deserialize;
use std::path::Path;

use crate::error::CoreError;

pub const API_KEY_ENV: &str = "FIELDNOTE_API_KEY";

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_MAX_TOKENS: u32 = 150;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    model: ModelConfig,
}

impl ModelConfig {
    /// Loads model settings from a config file. A missing file yields
    /// defaults; a malformed file is an error rather than a silent reset.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs_err::read_to_string(path).map_err(|err| CoreError::Io {
            context: format!("reading {}", path.display()),
            source: err,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|err| CoreError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
        Ok(file.model)
    }

    /// Resolved bearer token: environment wins over the config file.
    pub fn resolved_api_key(&self) -> Option<String> {
        match std::env::var(API_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => self.api_key.clone(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ModelConfig::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, 150);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[model]\nmodel = \"gpt-4o-mini\"\n").unwrap();

        let config = ModelConfig::load(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_tokens, 150);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[model\n").unwrap();

        assert!(matches!(
            ModelConfig::load(&path),
            Err(CoreError::ConfigMalformed { .. })
        ));
    }

    #[test]
    fn file_api_key_is_used_when_env_unset() {
        let config = ModelConfig {
            api_key: Some("file-key".to_string()),
            ..ModelConfig::default()
        };
        // Only meaningful when the env var is not set in the test runner.
        if std::env::var(API_KEY_ENV).is_err() {
            assert_eq!(config.resolved_api_key().as_deref(), Some("file-key"));
        }
    }
}
