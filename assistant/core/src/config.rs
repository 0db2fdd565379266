//! TOML Configuration File Support
//!
//! Centralized configuration loading for the assistant, backed by an optional
//! TOML file at `~/.config/semera-assistant/assistant.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [provider]
//! model = "gemini-3-flash-preview"
//! temperature = 0.2
//! request_timeout_secs = 120
//!
//! [storage]
//! data_dir = "/var/lib/semera-assistant"
//! key = "semera_logia_chat_history"
//!
//! [assistant]
//! welcome_text = "Welcome!"
//! ```
//!
//! The API key is read from `GEMINI_API_KEY` (or `API_KEY`) only and never
//! from the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_API_BASE;

// =============================================================================
// Defaults
// =============================================================================

/// Default hosted model
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default persistence key for the conversation log
pub const DEFAULT_STORAGE_KEY: &str = "semera_logia_chat_history";

/// Greeting shown as the permanent head of an empty conversation
pub const DEFAULT_WELCOME_TEXT: &str =
    "እንኳን ደህና መጡ! እኔ የሰመራ-ሎግያ ገቢዎች ፅ/ቤት የዲጂታል ረዳት ነኝ። በምን ልርዳዎት?";

/// Bot turn appended when the provider fails before answering
pub const DEFAULT_APOLOGY_TEXT: &str = "ይቅርታ፣ ስህተት ተፈጥሯል። እባክዎን እንደገና ይሞክሩ።";

/// Default system instruction for the revenue office assistant
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful, professional digital assistant for the Semera-Logia City \
Administration Revenues Office (የሰመራ-ሎግያ ከተማ አስተዳደር ገቢዎች ፅህፈት ቤት) in Ethiopia.

You help citizens, investors, and business owners with:
- Tax inquiries (Income tax, VAT, TOT, Business Profit Tax).
- Registration procedures and required documents.
- Payment deadlines and methods (for example Telebirr and bank transfers).
- Office locations and working hours.

Guidelines:
1. Respond primarily in Amharic, with English translations for key technical terms.
2. Be polite and accurate.
3. Use the googleSearch tool for up-to-date tax laws when unsure.
4. For complex legal matters, advise a visit to the office: Semera-Logia City \
Administration Building, 2nd Floor.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the effective configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[provider]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Model identifier
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// API root URL
    pub api_base: Option<String>,
    /// System instruction override
    pub system_prompt: Option<String>,
    /// Whole-request timeout in seconds (unset = unbounded)
    pub request_timeout_secs: Option<u64>,
}

/// `[storage]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageToml {
    /// Directory holding the persisted log
    pub data_dir: Option<PathBuf>,
    /// Persistence key
    pub key: Option<String>,
}

/// `[assistant]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// Greeting turn
    pub welcome_text: Option<String>,
    /// Apology turn
    pub apology_text: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfigToml {
    /// Provider section
    pub provider: ProviderToml,
    /// Storage section
    pub storage: StorageToml,
    /// Assistant section
    pub assistant: AssistantToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Effective assistant configuration
#[derive(Clone)]
pub struct AssistantConfig {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// API root URL
    pub api_base: String,
    /// Provider API key
    pub api_key: Option<String>,
    /// System instruction sent with every request
    pub system_prompt: String,
    /// Whole-request timeout (None = unbounded)
    pub request_timeout: Option<Duration>,
    /// Directory holding the persisted log (None = platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Persistence key
    pub storage_key: String,
    /// Greeting turn
    pub welcome_text: String,
    /// Apology turn
    pub apology_text: String,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout: None,
            data_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            welcome_text: DEFAULT_WELCOME_TEXT.to_string(),
            apology_text: DEFAULT_APOLOGY_TEXT.to_string(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("data_dir", &self.data_dir)
            .field("storage_key", &self.storage_key)
            .field("config_file_path", &self.config_file_path)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl AssistantConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Directory for the persisted log, falling back to the platform default
    #[must_use]
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(crate::storage::FileStorage::default_dir)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a temperature outside
    /// `0.0..=2.0`, a blank model, or a blank storage key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/semera-assistant/assistant.toml` or
/// `~/.config/semera-assistant/assistant.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("semera-assistant").join("assistant.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<AssistantConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<&Path>) -> Result<AssistantConfig, ConfigError> {
    let mut config = load_file(path)?;
    apply_env_config(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Defaults plus the TOML file, without consulting the environment
fn load_file(path: Option<&Path>) -> Result<AssistantConfig, ConfigError> {
    let mut config = AssistantConfig::default();

    let Some(config_path) = path else {
        return Ok(config);
    };

    if !config_path.exists() {
        tracing::debug!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return Ok(config);
    }

    let toml_content =
        std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
            path: config_path.to_path_buf(),
            source: e,
        })?;

    let toml_config: AssistantConfigToml = toml::from_str(&toml_content)?;
    apply_toml_config(&mut config, toml_config);
    config.config_file_path = Some(config_path.to_path_buf());
    config.source = ConfigSource::File;

    tracing::info!(path = %config_path.display(), "Loaded configuration from file");
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AssistantConfig, toml: AssistantConfigToml) {
    let AssistantConfigToml {
        provider,
        storage,
        assistant,
    } = toml;

    if let Some(model) = provider.model {
        config.model = model;
    }
    if let Some(temperature) = provider.temperature {
        config.temperature = temperature;
    }
    if let Some(api_base) = provider.api_base {
        config.api_base = api_base;
    }
    if let Some(prompt) = provider.system_prompt {
        config.system_prompt = prompt;
    }
    if let Some(secs) = provider.request_timeout_secs {
        config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    if let Some(dir) = storage.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(key) = storage.key {
        config.storage_key = key;
    }

    if let Some(text) = assistant.welcome_text {
        config.welcome_text = text;
    }
    if let Some(text) = assistant.apology_text {
        config.apology_text = text;
    }
}

/// Apply environment variables through `lookup`
fn apply_env_config<F>(config: &mut AssistantConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("API_KEY")) {
        config.api_key = Some(key);
    }
    if let Some(model) = non_empty("ASSISTANT_MODEL") {
        config.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = non_empty("ASSISTANT_DATA_DIR") {
        config.data_dir = Some(PathBuf::from(dir));
        config.source = ConfigSource::Env;
    }
    if let Some(key) = non_empty("ASSISTANT_STORAGE_KEY") {
        config.storage_key = key;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override
    pub model: Option<String>,
    /// Data directory override
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set data directory override
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AssistantConfig) {
        if self.model.is_some() || self.data_dir.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref model) = self.model {
            config.model = model.clone();
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = Some(dir.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
