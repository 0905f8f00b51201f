//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. Explicit path
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! API keys are never stored in the file. Each provider names the
//! environment variable holding its key.
//!
//! ```toml
//! [retry]
//! max_attempts = 4
//! initial_delay_ms = 250
//!
//! [stream]
//! buffer_size = 128
//!
//! [cache]
//! max_entries = 5000
//! ttl_secs = 600
//!
//! [[providers]]
//! name = "acme"
//! base_url = "https://api.acme.dev/v1"
//! api_key_env = "ACME_API_KEY"
//! include_usage = true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::providers::{OpenAiCompatibleProvider, ProviderRegistry, RetryConfig};
use crate::stream::DEFAULT_STREAM_BUFFER;
use crate::{HuginnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Retry policy. Absent: no retries.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub stream: StreamConfig,
    /// Embedding cache. Absent: no cache.
    #[serde(default)]
    pub cache: Option<CacheSection>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// Streaming configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Bounded channel capacity between vendor and consumer (default: 64).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    DEFAULT_STREAM_BUFFER
}

/// Embedding cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_entries() -> u64 {
    CacheConfig::default().max_entries
}

fn default_ttl_secs() -> u64 {
    CacheConfig::default().ttl.as_secs()
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig::new()
            .max_entries(section.max_entries)
            .ttl(Duration::from_secs(section.ttl_secs))
    }
}

/// One OpenAI-compatible provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    /// Registry id, also the provider options/metadata key.
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key. Absent: no auth header.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub include_usage: bool,
    #[serde(default)]
    pub supports_structured_outputs: bool,
    /// Request timeout in seconds (default: 120).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ProviderEntry {
    /// Build the provider, reading the API key from the environment.
    pub fn build(&self) -> Result<OpenAiCompatibleProvider> {
        let mut builder = OpenAiCompatibleProvider::builder(&self.name, &self.base_url)
            .include_usage(self.include_usage)
            .supports_structured_outputs(self.supports_structured_outputs);
        if let Some(var) = &self.api_key_env {
            builder = builder.api_key_env(var);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &self.query_params {
            builder = builder.query_param(name, value);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(&path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            HuginnError::Configuration(msg) => {
                HuginnError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.providers {
            if !seen.insert(entry.name.as_str()) {
                return Err(HuginnError::Configuration(format!(
                    "Duplicate provider name: {}",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }

    /// Build a registry with every configured provider.
    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        if let Some(retry) = &self.retry {
            registry.set_retry_config(retry.clone());
        }
        registry.set_stream_buffer_size(self.stream.buffer_size);
        if let Some(cache) = &self.cache {
            registry.set_embedding_cache(cache.into());
        }
        for entry in &self.providers {
            registry.register(entry.name.clone(), Arc::new(entry.build()?));
        }
        Ok(registry)
    }
}
