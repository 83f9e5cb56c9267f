//! Application configuration.
//!
//! Read from `<config_dir>/roofmate/config.toml` (or an explicit path), then
//! overridden by `ROOFMATE_*` environment variables. Every field has a
//! default, so a missing file is not an error.
//!
//! ```toml
//! factors_path = "/etc/roofmate/factors.toml"
//!
//! [advisory]
//! enabled = true
//! provider = "openai"
//! model = "gpt-4o"
//! timeout_secs = 20
//!
//! [storage]
//! data_dir = "/var/lib/roofmate"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use keyring::Entry;
use serde::Deserialize;
use tracing::{info, warn};

use crate::advisory::AdvisoryProvider;
use crate::error::ConfigError;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 120;
const KEYRING_USER: &str = "roofmate";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    pub provider: String,
    /// Provider default when unset
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            model: None,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom material factor table; the embedded one is used when unset
    pub factors_path: Option<PathBuf>,
    pub advisory: AdvisoryConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Apply `ROOFMATE_*` overrides read through `get`.
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = get("ROOFMATE_PROVIDER") {
            self.advisory.provider = provider;
        }
        if let Some(model) = get("ROOFMATE_MODEL") {
            self.advisory.model = Some(model);
        }
        if let Some(secs) = get("ROOFMATE_TIMEOUT_SECS") {
            self.advisory.timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("ROOFMATE_TIMEOUT_SECS must be a whole number, got '{}'", secs))
            })?;
        }
        if let Some(dir) = get("ROOFMATE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = get("ROOFMATE_ADVISORY") {
            self.advisory.enabled = parse_switch(&flag).ok_or_else(|| {
                ConfigError::Invalid(format!("ROOFMATE_ADVISORY must be on or off, got '{}'", flag))
            })?;
        }
        Ok(())
    }

    pub fn provider(&self) -> Result<AdvisoryProvider, ConfigError> {
        AdvisoryProvider::from_str(&self.advisory.provider)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn model(&self) -> Result<String, ConfigError> {
        match &self.advisory.model {
            Some(model) if !model.trim().is_empty() => Ok(model.clone()),
            _ => Ok(self.provider()?.default_model().to_string()),
        }
    }

    /// Advisory timeout, clamped to 1..=120 seconds.
    pub fn timeout(&self) -> Duration {
        let secs = self.advisory.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        if secs != self.advisory.timeout_secs {
            warn!(
                "Advisory timeout {}s out of range, using {}s",
                self.advisory.timeout_secs, secs
            );
        }
        Duration::from_secs(secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("roofmate"))
                .unwrap_or_else(|| PathBuf::from(".roofmate"))
        })
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir().join("calculations.db")
    }

    pub fn knowledge_db_path(&self) -> PathBuf {
        self.data_dir().join("knowledge.db")
    }
}

/// `<config_dir>/roofmate/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("roofmate").join("config.toml"))
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Keychain service name for a provider's API key.
pub fn keyring_service(provider: AdvisoryProvider) -> String {
    format!("roofmate-{}-api", provider)
}

/// Resolve the API key: `ROOFMATE_API_KEY`, then the provider's own
/// variable, then the OS keychain.
pub fn resolve_api_key(provider: AdvisoryProvider) -> Option<String> {
    resolve_api_key_with(provider, |key| std::env::var(key).ok(), keychain_lookup)
}

pub fn resolve_api_key_with<E, K>(provider: AdvisoryProvider, env: E, keychain: K) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
    K: Fn(&str) -> Option<String>,
{
    let non_empty = |v: String| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    };

    env("ROOFMATE_API_KEY")
        .and_then(non_empty)
        .or_else(|| env(provider.api_key_env()).and_then(non_empty))
        .or_else(|| keychain(&keyring_service(provider)).and_then(non_empty))
}

fn keychain_lookup(service: &str) -> Option<String> {
    let entry = match Entry::new(service, KEYRING_USER) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Failed to create keyring entry for {}: {}", service, e);
            return None;
        }
    };
    match entry.get_password() {
        Ok(password) => Some(password),
        Err(keyring::Error::NoEntry) => {
            info!("No API key found in keychain for service: {}", service);
            None
        }
        Err(e) => {
            warn!("Failed to get password for {}: {}", service, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.advisory.enabled);
        assert_eq!(config.provider().unwrap(), AdvisoryProvider::OpenAi);
        assert_eq!(config.model().unwrap(), "gpt-4o");
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert!(config.factors_path.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config = AppConfig::from_toml_str(
            r#"
factors_path = "/tmp/factors.toml"

[advisory]
provider = "claude"
timeout_secs = 15

[storage]
data_dir = "/tmp/roofmate-data"
"#,
        )
        .unwrap();
        assert_eq!(config.factors_path, Some(PathBuf::from("/tmp/factors.toml")));
        assert_eq!(config.provider().unwrap(), AdvisoryProvider::Claude);
        assert_eq!(config.model().unwrap(), "claude-sonnet-4-20250514");
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert!(config.advisory.enabled);
        assert_eq!(
            config.history_db_path(),
            PathBuf::from("/tmp/roofmate-data/calculations.db")
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[advisory\nprovider ="),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = AppConfig::from_file(Path::new("/nonexistent/roofmate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env_of(&[
                ("ROOFMATE_PROVIDER", "openrouter"),
                ("ROOFMATE_MODEL", "anthropic/claude-sonnet-4"),
                ("ROOFMATE_TIMEOUT_SECS", "30"),
                ("ROOFMATE_DATA_DIR", "/srv/roofmate"),
                ("ROOFMATE_ADVISORY", "off"),
            ]))
            .unwrap();

        assert_eq!(config.provider().unwrap(), AdvisoryProvider::OpenRouter);
        assert_eq!(config.model().unwrap(), "anthropic/claude-sonnet-4");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.data_dir(), PathBuf::from("/srv/roofmate"));
        assert!(!config.advisory.enabled);
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_overrides(env_of(&[("ROOFMATE_TIMEOUT_SECS", "soon")]))
            .is_err());
        assert!(config
            .apply_overrides(env_of(&[("ROOFMATE_ADVISORY", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_timeout_clamped() {
        let mut config = AppConfig::default();
        config.advisory.timeout_secs = 0;
        assert_eq!(config.timeout(), Duration::from_secs(1));
        config.advisory.timeout_secs = 600;
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_unsupported_provider_is_config_error() {
        let mut config = AppConfig::default();
        config.advisory.provider = "kimi".to_string();
        assert!(matches!(config.provider(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_api_key_resolution_order() {
        let no_keychain = |_: &str| None;
        let keychain = |service: &str| {
            (service == "roofmate-openai-api").then(|| "sk-keychain".to_string())
        };

        let key = resolve_api_key_with(
            AdvisoryProvider::OpenAi,
            env_of(&[("ROOFMATE_API_KEY", "sk-roofmate"), ("OPENAI_API_KEY", "sk-openai")]),
            keychain,
        );
        assert_eq!(key.as_deref(), Some("sk-roofmate"));

        let key = resolve_api_key_with(
            AdvisoryProvider::OpenAi,
            env_of(&[("ROOFMATE_API_KEY", "  "), ("OPENAI_API_KEY", "sk-openai")]),
            keychain,
        );
        assert_eq!(key.as_deref(), Some("sk-openai"));

        let key = resolve_api_key_with(AdvisoryProvider::OpenAi, env_of(&[]), keychain);
        assert_eq!(key.as_deref(), Some("sk-keychain"));

        let key = resolve_api_key_with(AdvisoryProvider::Claude, env_of(&[]), no_keychain);
        assert!(key.is_none());
    }
}
