//! Configuration for the voicelink client.
//!
//! Settings are resolved from a YAML file and the process environment, with
//! priority: YAML > environment variables > defaults. The long-lived API
//! secret comes only from the environment (`OPENAI_API_KEY`) or YAML; it is
//! never taken from the command line.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;
use zeroize::Zeroizing;

/// Default API base URL.
const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Default model to converse with.
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Default voice for synthesized audio.
const DEFAULT_VOICE: &str = "alloy";

/// Voices the endpoint is known to accept. Unknown values are allowed (the
/// endpoint is authoritative) but logged.
const KNOWN_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "sage", "shimmer", "verse",
];

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting has no value from any source
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A setting has an unusable value
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Which setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed
    #[error("failed to parse {path}: {source}")]
    Yaml {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },
}

/// YAML file shape; every field optional so the file can set just what it
/// needs.
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    instructions: Option<String>,
    modalities: Option<Vec<String>>,
}

/// Values found in the process environment.
#[derive(Debug, Default)]
struct EnvOverrides {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    instructions: Option<String>,
}

impl EnvOverrides {
    fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_base: var("VOICELINK_API_BASE"),
            api_key: var("OPENAI_API_KEY"),
            model: var("VOICELINK_MODEL"),
            voice: var("VOICELINK_VOICE"),
            instructions: var("VOICELINK_INSTRUCTIONS"),
        }
    }
}

/// Resolved client configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Base URL of the remote endpoint
    pub api_base: String,
    /// Long-lived API secret
    pub api_key: Zeroizing<String>,
    /// Model to converse with
    pub model: String,
    /// Voice for synthesized audio
    pub voice: String,
    /// System instructions for the assistant
    pub instructions: Option<String>,
    /// Response modalities for the start directive
    pub modalities: Vec<String>,
}

impl AppConfig {
    /// Load from the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(YamlConfig::default(), EnvOverrides::from_process())
    }

    /// Load from a YAML file with environment variables filling the gaps.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml: YamlConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        Self::resolve(yaml, EnvOverrides::from_process())
    }

    fn resolve(yaml: YamlConfig, env: EnvOverrides) -> Result<Self, ConfigError> {
        let config = Self {
            api_base: yaml
                .api_base
                .or(env.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: Zeroizing::new(
                yaml.api_key
                    .or(env.api_key)
                    .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
            ),
            model: yaml
                .model
                .or(env.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: yaml
                .voice
                .or(env.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            instructions: yaml.instructions.or(env.instructions),
            modalities: yaml
                .modalities
                .unwrap_or_else(|| vec!["text".to_string(), "audio".to_string()]),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.api_base).map_err(|e| ConfigError::Invalid {
            field: "api_base",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api_base",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                reason: "must not be empty".to_string(),
            });
        }
        if !KNOWN_VOICES.contains(&self.voice.as_str()) {
            warn!(voice = %self.voice, "voice not in the known set, passing through");
        }
        Ok(())
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("instructions", &self.instructions)
            .field("modalities", &self.modalities)
            .finish()
    }
}
