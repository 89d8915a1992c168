use config::{self, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::queue::{OverflowPolicy, QueueConfig};

/// Prefix for environment variable overrides, e.g. `HOSTPULSE__SECRET`
pub const ENV_PREFIX: &str = "HOSTPULSE";

/// Default location of the agent configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostpulse.toml";

/// Logging level
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Agent settings
#[derive(Debug, Deserialize, Clone)]
pub struct AgentSettings {
    /// Address of the collection server, `host[:port]` or a full base URL
    pub server: String,
    /// Identifier reported to the server; defaults to the host name
    #[serde(default)]
    pub fqdn: Option<String>,
    /// Shared secret used in the server endpoints
    pub secret: String,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Timeout for every HTTP request made by the agent
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Upper bound on queued measurements; unbounded when absent
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// What to drop once `queue_capacity` is reached
    #[serde(default)]
    pub queue_overflow: OverflowPolicy,
    /// Send whatever is queued one last time when shutting down
    #[serde(default = "default_flush_on_shutdown")]
    pub flush_on_shutdown: bool,
    /// Per-collector polling interval overrides in seconds
    #[serde(default)]
    pub intervals: HashMap<String, u64>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_flush_on_shutdown() -> bool {
    true
}

impl AgentSettings {
    /// The identifier the server knows this host by
    pub fn client_id(&self) -> Result<String> {
        match &self.fqdn {
            Some(fqdn) if !fqdn.trim().is_empty() => Ok(fqdn.trim().to_string()),
            _ => hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .map_err(|e| AgentError::Config(format!("Cannot determine host name: {}", e))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            overflow: self.queue_overflow,
        }
    }

    /// Interval for collector `name`, falling back to `default`
    pub fn interval_for(&self, name: &str, default: Duration) -> Duration {
        self.intervals
            .get(name)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(default)
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(AgentError::Config("`server` must not be empty".to_string()));
        }
        if self.secret.trim().is_empty() {
            return Err(AgentError::Config("`secret` must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AgentError::Config(
                "`request_timeout_secs` must be positive".to_string(),
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(AgentError::Config(
                "`queue_capacity` must be positive when set".to_string(),
            ));
        }
        if let Some((name, _)) = self.intervals.iter().find(|(_, secs)| **secs == 0) {
            return Err(AgentError::Config(format!(
                "interval for collector `{}` must be positive",
                name
            )));
        }
        Ok(())
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path (TOML format); skipped when missing
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
    /// Explicit key/value override, e.g. from the command line
    Override(String, String),
}

/// Builds [`AgentSettings`] from an ordered list of sources; later sources win
pub struct SettingsBuilder {
    sources: Vec<ConfigSource>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a TOML file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources
            .push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Override a single key
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.sources
            .push(ConfigSource::Override(key.into(), value.into()));
        self
    }

    /// Override a key only when a value is present
    pub fn set_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Build and validate the settings
    pub fn build(self) -> Result<AgentSettings> {
        let mut builder = config::Config::builder();

        for source in self.sources {
            match source {
                ConfigSource::File(path) => {
                    if !path.exists() {
                        continue;
                    }
                    builder = builder.add_source(
                        config::File::from(path.as_path()).format(FileFormat::Toml),
                    );
                }
                ConfigSource::Environment(prefix) => {
                    builder = builder.add_source(
                        config::Environment::with_prefix(&prefix)
                            .prefix_separator("__")
                            .separator("__")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Toml(toml_str) => {
                    builder =
                        builder.add_source(config::File::from_str(&toml_str, FileFormat::Toml));
                }
                ConfigSource::Override(key, value) => {
                    builder = builder.set_override(key, value)?;
                }
            }
        }

        let settings: AgentSettings = builder
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| {
                AgentError::Config(format!("Failed to deserialize configuration: {}", e))
            })?;

        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
