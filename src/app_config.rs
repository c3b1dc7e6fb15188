use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Engine behaviour
    #[serde(default)]
    pub engine: EngineConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Storage configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    // @field: Database file, defaults to the user data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    // @field: SQLite busy timeout
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Version engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    // @field: Seconds before an idle writelock may be taken over
    #[serde(default = "default_writelock_ttl_secs")]
    pub writelock_ttl_secs: u64,

    // @field: Writers must hold the writelock, not merely avoid someone else's
    #[serde(default)]
    pub require_writelock: bool,

    // @field: Retries when a concurrent writer claims the version number
    #[serde(default = "default_max_allocation_retries")]
    pub max_allocation_retries: u32,

    // @field: Base backoff between allocation retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    // @field: Memoize tip lookups
    #[serde(default = "default_true")]
    pub tip_cache_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            writelock_ttl_secs: default_writelock_ttl_secs(),
            require_writelock: false,
            max_allocation_retries: default_max_allocation_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            tip_cache_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Writelock TTL as a chrono duration
    pub fn writelock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.writelock_ttl_secs as i64)
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching `log` filter
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_writelock_ttl_secs() -> u64 {
    30 // editors renew well within this window
}

fn default_max_allocation_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25 // doubled on each retry, plus jitter
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.engine.writelock_ttl_secs == 0 {
            return Err(anyhow!("engine.writelock_ttl_secs must be greater than zero"));
        }

        if self.engine.writelock_ttl_secs > i64::MAX as u64 / 1000 {
            return Err(anyhow!("engine.writelock_ttl_secs is out of range"));
        }

        if let Some(path) = &self.database.path {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("database.path must not be empty when set"));
            }
        }

        Ok(())
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;

        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the configuration, writing defaults first if the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());

        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;

        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", path.display()))?;

        Ok(config)
    }
}
