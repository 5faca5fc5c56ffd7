mod env_manager;

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub use env_manager::{ApiKeys, PRIMARY_KEY_VAR, SECONDARY_KEY_VAR};

const CONFIG_DIR_NAME: &str = "material-ai";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration struct for the application
///
/// Loaded once at startup and shared read-only afterwards. Everything except
/// credentials may come from a TOML file; credentials only come from the
/// environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Answer provider endpoints and timeouts
    pub providers: ProvidersConfig,
    /// GitHub API settings
    pub github: GitHubConfig,
    /// Document processing settings
    pub documents: DocumentConfig,
    /// Credentials read from the environment
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Maximum accepted request body size, in bytes
    pub max_upload_bytes: usize,
}

/// Ordered answer provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Provider tried first
    pub primary: ProviderSettings,
    /// Provider tried when the primary fails
    pub secondary: ProviderSettings,
}

/// Endpoint and model of one OpenAI-compatible provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Name used in logs and responses
    pub name: String,
    /// Full chat-completions URL
    pub endpoint: String,
    /// Model identifier sent with each request
    pub model: String,
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL of the REST API
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Document processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Maximum number of characters in the returned excerpt
    pub excerpt_chars: usize,
    /// Maximum decompressed size of a DOCX body, in bytes
    pub max_text_bytes: u64,
}

/// Resolved settings for a provider whose credential is present
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Name used in logs and responses
    pub name: String,
    /// Full chat-completions URL
    pub endpoint: String,
    /// Bearer credential
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Upper bound for one attempt
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Loads configuration from a TOML file and credentials from the environment
    ///
    /// An explicit `path` must exist. Without one, the default location
    /// (`<config_dir>/material-ai/config.toml`) is used when present and the
    /// built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };
        config.api_keys = ApiKeys::from_env();
        Ok(config)
    }

    /// Parses a TOML configuration file, leaving credentials empty
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Replaces the credentials
    pub fn with_api_keys(mut self, api_keys: ApiKeys) -> Self {
        self.api_keys = api_keys;
        self
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ServiceError::Config("server.port must be non-zero".into()));
        }
        if self.providers.timeout_secs == 0 {
            return Err(ServiceError::Config("providers.timeout_secs must be non-zero".into()));
        }
        if self.github.timeout_secs == 0 {
            return Err(ServiceError::Config("github.timeout_secs must be non-zero".into()));
        }
        if self.documents.excerpt_chars == 0 {
            return Err(ServiceError::Config("documents.excerpt_chars must be non-zero".into()));
        }
        if self.documents.max_text_bytes == 0 {
            return Err(ServiceError::Config("documents.max_text_bytes must be non-zero".into()));
        }
        ensure_http_url("providers.primary.endpoint", &self.providers.primary.endpoint)?;
        ensure_http_url("providers.secondary.endpoint", &self.providers.secondary.endpoint)?;
        ensure_http_url("github.api_base", &self.github.api_base)?;
        Ok(())
    }

    /// Providers in priority order, skipping those without a credential
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        let timeout = Duration::from_secs(self.providers.timeout_secs);
        [
            (&self.providers.primary, &self.api_keys.primary),
            (&self.providers.secondary, &self.api_keys.secondary),
        ]
        .into_iter()
        .filter_map(|(settings, key)| {
            key.as_ref().map(|api_key| ProviderConfig {
                name: settings.name.clone(),
                endpoint: settings.endpoint.clone(),
                api_key: api_key.clone(),
                model: settings.model.clone(),
                timeout,
            })
        })
        .collect()
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn ensure_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| ServiceError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ServiceError::Config(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            primary: ProviderSettings {
                name: "deepseek".to_string(),
                endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
                model: "deepseek-chat".to_string(),
            },
            secondary: ProviderSettings {
                name: "openai".to_string(),
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-3.5-turbo".to_string(),
            },
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: 500,
            max_text_bytes: crate::documents::DEFAULT_MAX_TEXT_BYTES,
        }
    }
}
