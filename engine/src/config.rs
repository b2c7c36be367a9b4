use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use gemdesk_context::{
    CacheSettings, DEFAULT_CACHE_TTL, DEFAULT_MAX_CONTEXT_TOKENS, DEFAULT_MAX_FILES, PollPolicy,
};
use gemdesk_types::{ApiKey, ModelName, ModelParseError, ThinkingLevel};
use gemdesk_utils::DEFAULT_MIN_SEND_INTERVAL;
use serde::Deserialize;
use thiserror::Error;

use crate::session::SessionSettings;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);

// Default value function for serde (bool::default() is false, so only true needs a fn)
pub(crate) const fn default_true() -> bool {
    true
}

/// `~/.gemdesk/config.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct GemdeskConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub cache: Option<CacheConfig>,
    pub upload: Option<UploadConfig>,
    pub generation: Option<GenerationConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid thinking_level {0:?} (expected minimal, low, medium or high)")]
    ThinkingLevel(String),
    #[error("Invalid model: {0}")]
    Model(#[from] ModelParseError),
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    #[serde(default)]
    pub search_grounding: bool,
    pub max_files: Option<usize>,
    pub max_context_tokens: Option<u64>,
    pub min_send_interval_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub google: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let google = if self.google.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("google", &google).finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadConfig {
    pub poll_interval_ms: Option<u64>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationConfig {
    pub turn_timeout_secs: Option<u64>,
}

/// Replace `${VAR}` with the variable's value; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            Some(_) => {
                // `${}` stays literal
                out.push_str("${}");
                rest = &after[1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl GemdeskConfig {
    /// `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Configured key (after `${VAR}` expansion), else `GEMINI_API_KEY`.
    #[must_use]
    pub fn api_key(&self) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.google.as_deref())
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
            .map(|key| ApiKey::new(key.trim()))
    }

    pub fn model(&self) -> Result<ModelName, ConfigError> {
        match self.app.as_ref().and_then(|app| app.model.as_deref()) {
            Some(raw) => Ok(ModelName::parse(raw)?),
            None => Ok(ModelName::default()),
        }
    }

    /// Session settings with defaults filled in for everything unset.
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let app = self.app.as_ref();
        let thinking_level = match app.and_then(|a| a.thinking_level.as_deref()) {
            Some(raw) => ThinkingLevel::parse(raw)
                .ok_or_else(|| ConfigError::ThinkingLevel(raw.to_string()))?,
            None => ThinkingLevel::default(),
        };

        let cache = self.cache.as_ref().map_or_else(CacheSettings::default, |c| {
            CacheSettings {
                enabled: c.enabled,
                ttl: c.ttl_seconds.map_or(DEFAULT_CACHE_TTL, Duration::from_secs),
            }
        });

        let default_poll = PollPolicy::default();
        let poll = self.upload.as_ref().map_or(default_poll, |u| PollPolicy {
            interval: u
                .poll_interval_ms
                .map_or(default_poll.interval, Duration::from_millis),
            timeout: u
                .poll_timeout_secs
                .map_or(default_poll.timeout, Duration::from_secs),
        });

        Ok(SessionSettings {
            max_files: app.and_then(|a| a.max_files).unwrap_or(DEFAULT_MAX_FILES),
            max_context_tokens: app
                .and_then(|a| a.max_context_tokens)
                .unwrap_or(DEFAULT_MAX_CONTEXT_TOKENS),
            thinking_level,
            search_grounding: app.is_some_and(|a| a.search_grounding),
            min_send_interval: app
                .and_then(|a| a.min_send_interval_ms)
                .map_or(DEFAULT_MIN_SEND_INTERVAL, Duration::from_millis),
            cache,
            poll,
            turn_timeout: self
                .generation
                .as_ref()
                .and_then(|g| g.turn_timeout_secs)
                .map_or(DEFAULT_TURN_TIMEOUT, Duration::from_secs),
        })
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gemdesk").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            std::env::set_var("GEMDESK_TEST_CONFIG_VAR", "replaced");
        }
        let result = expand_env_vars("prefix ${GEMDESK_TEST_CONFIG_VAR} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            std::env::remove_var("GEMDESK_TEST_CONFIG_VAR");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            std::env::remove_var("GEMDESK_MISSING_VAR_FOR_TEST");
        }
        let result = expand_env_vars("before ${GEMDESK_MISSING_VAR_FOR_TEST} after");
        assert_eq!(result, "before  after");
    }

    #[test]
    fn expand_env_vars_unclosed_and_empty_preserved() {
        assert_eq!(expand_env_vars("${UNCLOSED"), "${UNCLOSED");
        assert_eq!(expand_env_vars("a ${} b"), "a ${} b");
    }

    #[test]
    fn expand_env_vars_unicode_content() {
        assert_eq!(expand_env_vars("日本語 ✓"), "日本語 ✓");
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: GemdeskConfig = toml::from_str("").unwrap();
        assert!(config.app.is_none());
        let settings = config.session_settings().unwrap();
        assert_eq!(settings.max_files, DEFAULT_MAX_FILES);
        assert_eq!(settings.max_context_tokens, DEFAULT_MAX_CONTEXT_TOKENS);
        assert_eq!(settings.thinking_level, ThinkingLevel::High);
        assert!(!settings.search_grounding);
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.ttl, DEFAULT_CACHE_TTL);
        assert_eq!(settings.turn_timeout, DEFAULT_TURN_TIMEOUT);
        assert_eq!(settings.poll, PollPolicy::default());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[app]
model = "gemini-3-pro-preview"
thinking_level = "Medium"
search_grounding = true
max_files = 10
max_context_tokens = 200000
min_send_interval_ms = 250

[cache]
enabled = false
ttl_seconds = 600

[upload]
poll_interval_ms = 50
poll_timeout_secs = 30

[generation]
turn_timeout_secs = 90
"#;
        let config: GemdeskConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model().unwrap().as_str(), "gemini-3-pro-preview");

        let settings = config.session_settings().unwrap();
        assert_eq!(settings.thinking_level, ThinkingLevel::Medium);
        assert!(settings.search_grounding);
        assert_eq!(settings.max_files, 10);
        assert_eq!(settings.max_context_tokens, 200_000);
        assert_eq!(settings.min_send_interval, Duration::from_millis(250));
        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache.ttl, Duration::from_secs(600));
        assert_eq!(settings.poll.interval, Duration::from_millis(50));
        assert_eq!(settings.poll.timeout, Duration::from_secs(30));
        assert_eq!(settings.turn_timeout, Duration::from_secs(90));
    }

    #[test]
    fn invalid_thinking_level_is_rejected() {
        let config: GemdeskConfig = toml::from_str("[app]\nthinking_level = \"extreme\"").unwrap();
        assert!(matches!(
            config.session_settings(),
            Err(ConfigError::ThinkingLevel(level)) if level == "extreme"
        ));
    }

    #[test]
    fn api_key_expands_env_reference() {
        unsafe {
            std::env::set_var("GEMDESK_TEST_KEY_REF", "AIzaFromEnvironmentReference123");
        }
        let config: GemdeskConfig =
            toml::from_str("[api_keys]\ngoogle = \"${GEMDESK_TEST_KEY_REF}\"").unwrap();
        assert_eq!(
            config.api_key().map(|k| k.as_str().to_string()),
            Some("AIzaFromEnvironmentReference123".to_string())
        );
        unsafe {
            std::env::remove_var("GEMDESK_TEST_KEY_REF");
        }
    }

    #[test]
    fn api_keys_debug_redacts_values() {
        let keys = ApiKeys {
            google: Some("AIzaSyC789secret".to_string()),
        };
        let debug_output = format!("{keys:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AIzaSyC789secret"));
        assert!(format!("{:?}", ApiKeys::default()).contains("None"));
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[app\nmodel = 1").unwrap();
        let err = GemdeskConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
