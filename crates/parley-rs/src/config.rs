//! Relay configuration: built-in defaults, a TOML file, then environment.
//!
//! Precedence is environment > file > default, applied per key. The file is
//! optional; a missing file is normal and a broken one is logged and
//! ignored. Environment lookup goes through a caller-supplied function so
//! loading can be tested without touching the process environment.
//!
//! ```toml
//! [azure_openai]
//! endpoint = "https://example.openai.azure.com"
//! api_key = "..."
//! model = "gpt-4o"
//! api_version = "2024-06-01"
//!
//! [memory]
//! enabled = true
//! max_messages = 40
//! max_tokens = 2400
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::memory::{DEFAULT_MAX_APPROX_TOKENS, DEFAULT_MAX_MESSAGES, Limits};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ASSISTANT_CONFIG";

/// Config file used when neither a flag nor [`CONFIG_PATH_ENV`] names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_MODEL: &str = "AZURE_OPENAI_MODEL";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_MEMORY_ENABLED: &str = "ASSISTANT_MEMORY_ENABLED";
pub const ENV_MEMORY_MAX_MESSAGES: &str = "ASSISTANT_MEMORY_MAX_MESSAGES";
pub const ENV_MEMORY_MAX_TOKENS: &str = "ASSISTANT_MEMORY_MAX_TOKENS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// Upstream completion API settings (`[azure_openai]`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Resource endpoint URL. Default: empty.
    pub endpoint: String,
    /// API key. Default: empty, which makes every upstream call fail.
    pub api_key: String,
    /// Deployment name. Default: `"gpt-4o"`.
    pub model: String,
    /// Default: `"2024-06-01"`.
    pub api_version: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            api_version: "2024-06-01".to_string(),
        }
    }
}

/// Session memory settings (`[memory]`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MemorySettings {
    /// Default: `true`.
    pub enabled: bool,
    /// Default: `40`.
    pub max_messages: usize,
    /// Approximate token budget per session. Default: `2400`.
    #[serde(rename = "max_tokens")]
    pub max_approx_tokens: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_approx_tokens: DEFAULT_MAX_APPROX_TOKENS,
        }
    }
}

impl MemorySettings {
    pub fn limits(&self) -> Limits {
        Limits::new(self.max_messages, self.max_approx_tokens)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "azure_openai")]
    pub upstream: UpstreamSettings,
    pub memory: MemorySettings,
}

/// Public view of [`Settings`]. Reports whether a key is set, never the key.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConfigView {
    pub azure_openai: UpstreamView,
    pub memory: MemorySettings,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UpstreamView {
    pub endpoint: String,
    pub model: String,
    pub api_version: String,
    pub api_key_set: bool,
}

impl Settings {
    /// Load from the process environment and the config file.
    ///
    /// `path` overrides [`CONFIG_PATH_ENV`] and the default path.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading environment values through `env`.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut settings = match Self::from_file(&path) {
            Ok(Some(settings)) => {
                info!("Loaded config file: {}", path.display());
                settings
            }
            Ok(None) => {
                info!(
                    "Config file '{}' not found, using defaults and env overrides",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                warn!("{e} (using defaults and env overrides)");
                Self::default()
            }
        };

        settings.apply_env(env)?;
        Ok(settings)
    }

    /// Read and parse a TOML file. `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Overwrite fields with any environment values `env` returns.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env(ENV_ENDPOINT) {
            self.upstream.endpoint = v;
        }
        if let Some(v) = env(ENV_API_KEY) {
            self.upstream.api_key = v;
        }
        if let Some(v) = env(ENV_MODEL) {
            self.upstream.model = v;
        }
        if let Some(v) = env(ENV_API_VERSION) {
            self.upstream.api_version = v;
        }
        if let Some(v) = env(ENV_MEMORY_ENABLED) {
            self.memory.enabled = parse_bool(&v);
        }
        if let Some(v) = env(ENV_MEMORY_MAX_MESSAGES) {
            self.memory.max_messages = parse_count(ENV_MEMORY_MAX_MESSAGES, &v)?;
        }
        if let Some(v) = env(ENV_MEMORY_MAX_TOKENS) {
            self.memory.max_approx_tokens = parse_count(ENV_MEMORY_MAX_TOKENS, &v)?;
        }
        Ok(())
    }

    pub fn api_key_set(&self) -> bool {
        !self.upstream.api_key.is_empty()
    }

    pub fn view(&self) -> ConfigView {
        ConfigView {
            azure_openai: UpstreamView {
                endpoint: self.upstream.endpoint.clone(),
                model: self.upstream.model.clone(),
                api_version: self.upstream.api_version.clone(),
                api_key_set: self.api_key_set(),
            },
            memory: self.memory,
        }
    }
}

/// `1`, `true`, `yes` and `on` (any case, surrounding whitespace ignored)
/// are true. Everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
