//! Engine configuration
//!
//! One TOML document with a section per subsystem. Every section has
//! defaults, so an empty file is a valid configuration. Environment
//! variables of the form `QUILT_<SECTION>_<KEY>` override file values,
//! e.g. `QUILT_INDEX_MAX_ENTRIES=32` or `QUILT_PRESENCE_DEFAULT_TTL=5s`.

use crate::core_canvas::crdt::Site;
use crate::core_canvas::replica::ReplicaOptions;
use crate::core_canvas::spatial::IndexConfig;
use crate::core_canvas::store::ValidationRules;
use crate::logging::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

mod error;

pub use error::ConfigError;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "QUILT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub site: SiteConfig,
    pub index: IndexConfig,
    pub presence: PresenceConfig,
    pub sync: SyncConfig,
    pub logging: LogConfig,
    pub metrics: MetricsConfig,
}

/// Replica identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Fixed site id; a fresh one is generated per process when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Lifetime given to locally published presence
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// How often expired entries are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Buffered presence updates per subscriber
    pub capacity: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_millis(500),
            capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Buffered operation notifications per session
    pub op_capacity: usize,

    /// Buffered change events per subscriber
    pub change_capacity: usize,

    /// Re-broadcast operations received from one peer to the others
    pub relay_remote_ops: bool,

    /// Longest field name accepted from any source
    pub max_field_len: usize,

    /// Longest text value accepted from any source
    pub max_text_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let options = ReplicaOptions::default();
        let rules = ValidationRules::default();
        Self {
            op_capacity: options.op_capacity,
            change_capacity: options.change_capacity,
            relay_remote_ops: options.relay_remote_ops,
            max_field_len: rules.max_field_len,
            max_text_len: rules.max_text_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Register metric descriptions with the installed recorder
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EngineConfig {
    /// Load from a TOML file, then validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
        let config = Self::from_toml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults plus `QUILT_*` environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `QUILT_*` environment overrides on top of the current values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; keys are full variable names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |section: &str, key: &str| {
            let name = format!("{ENV_PREFIX}_{section}_{key}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((key, raw)) = get("SITE", "ID") {
            self.site.id = Some(parse(&key, &raw)?);
        }

        if let Some((key, raw)) = get("INDEX", "MAX_ENTRIES") {
            self.index.max_entries = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = get("INDEX", "MIN_ENTRIES") {
            self.index.min_entries = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = get("INDEX", "REBUILD_FACTOR") {
            self.index.rebuild_factor = parse(&key, &raw)?;
        }

        if let Some((key, raw)) = get("PRESENCE", "DEFAULT_TTL") {
            self.presence.default_ttl = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("PRESENCE", "SWEEP_INTERVAL") {
            self.presence.sweep_interval = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("PRESENCE", "CAPACITY") {
            self.presence.capacity = parse(&key, &raw)?;
        }

        if let Some((key, raw)) = get("SYNC", "OP_CAPACITY") {
            self.sync.op_capacity = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = get("SYNC", "CHANGE_CAPACITY") {
            self.sync.change_capacity = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = get("SYNC", "RELAY_REMOTE_OPS") {
            self.sync.relay_remote_ops = parse(&key, &raw)?;
        }

        if let Some((key, raw)) = get("LOGGING", "LEVEL") {
            self.logging.level = parse::<LogLevel>(&key, &raw)?;
        }
        if let Some((key, raw)) = get("LOGGING", "JSON_FORMAT") {
            self.logging.json_format = parse(&key, &raw)?;
        }

        if let Some((key, raw)) = get("METRICS", "ENABLED") {
            self.metrics.enabled = parse(&key, &raw)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = &self.index;
        if index.min_entries < 2 {
            return Err(invalid("index.min_entries must be at least 2"));
        }
        if index.min_entries > index.max_entries / 2 {
            return Err(invalid(format!(
                "index.min_entries ({}) must not exceed half of index.max_entries ({})",
                index.min_entries, index.max_entries
            )));
        }
        if !(index.rebuild_factor >= 1.0) {
            return Err(invalid("index.rebuild_factor must be at least 1.0"));
        }

        if self.presence.default_ttl.is_zero() {
            return Err(invalid("presence.default_ttl must be non-zero"));
        }
        if self.presence.sweep_interval.is_zero() {
            return Err(invalid("presence.sweep_interval must be non-zero"));
        }
        if self.presence.capacity == 0 {
            return Err(invalid("presence.capacity must be greater than 0"));
        }

        if self.sync.op_capacity == 0 || self.sync.change_capacity == 0 {
            return Err(invalid("sync capacities must be greater than 0"));
        }
        if self.sync.max_field_len == 0 {
            return Err(invalid("sync.max_field_len must be greater than 0"));
        }

        if let Some(id) = self.site.id {
            if id.is_nil() {
                return Err(invalid("site.id must not be the nil UUID"));
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|source| ConfigError::FileWrite { path: path.to_path_buf(), source })
    }

    /// Configured site, or a freshly generated one
    pub fn site(&self) -> Site {
        self.site.id.map(Site::new).unwrap_or_else(Site::generate)
    }

    pub fn replica_options(&self) -> ReplicaOptions {
        ReplicaOptions {
            index: self.index.clone(),
            validation: ValidationRules {
                max_field_len: self.sync.max_field_len,
                max_text_len: self.sync.max_text_len,
            },
            change_capacity: self.sync.change_capacity,
            op_capacity: self.sync.op_capacity,
            relay_remote_ops: self.sync.relay_remote_ops,
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue { key: key.to_string(), message: e.to_string() })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime_serde::re::humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::InvalidValue { key: key.to_string(), message: e.to_string() })
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationFailed(message.into())
}
