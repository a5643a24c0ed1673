//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{HddError, Result};

/// Lowest accepted poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Full hddled configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub indicator: IndicatorConfig,
    pub paths: PathsConfig,
}

/// Counter source binding and polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub counter_source: PathBuf,
    pub pages_in_key: String,
    pub pages_out_key: String,
}

/// GPIO binding for the LED.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndicatorConfig {
    pub gpio_root: PathBuf,
    pub pin: u32,
    /// Perform sysfs export + direction setup before opening the value file.
    pub export: bool,
}

/// Filesystem paths used by hddled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(skip)]
    pub config_file: PathBuf,
    pub pidfile: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            counter_source: PathBuf::from("/proc/vmstat"),
            pages_in_key: "pgpgin".to_string(),
            pages_out_key: "pgpgout".to_string(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pin: 199,
            export: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/etc/hddled/config.toml"),
            pidfile: PathBuf::from("/var/run/hddled.pid"),
            jsonl_log: PathBuf::from("/var/log/hddled/activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, apply env overrides and
    /// validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = Self::load_unvalidated(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load`] but without the final [`Config::validate`], for
    /// callers that layer more overrides on top and validate afterwards.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| HddError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(HddError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Parse a TOML document without env overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic hash of the effective config for the start-up log line.
    ///
    /// FNV-1a so the value is stable across processes and Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|name| env::var(name).ok())
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = var("HDDLED_POLL_INTERVAL_MS") {
            self.monitor.poll_interval_ms = parse_env_u64("HDDLED_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = var("HDDLED_COUNTER_SOURCE") {
            self.monitor.counter_source = PathBuf::from(raw);
        }
        if let Some(raw) = var("HDDLED_GPIO_ROOT") {
            self.indicator.gpio_root = PathBuf::from(raw);
        }
        if let Some(raw) = var("HDDLED_GPIO_PIN") {
            self.indicator.pin = parse_env_u32("HDDLED_GPIO_PIN", &raw)?;
        }
        if let Some(raw) = var("HDDLED_PIDFILE") {
            self.paths.pidfile = PathBuf::from(raw);
        }
        if let Some(raw) = var("HDDLED_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(HddError::InvalidConfig {
                details: format!(
                    "monitor.poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                    self.monitor.poll_interval_ms
                ),
            });
        }

        validate_key("monitor.pages_in_key", &self.monitor.pages_in_key)?;
        validate_key("monitor.pages_out_key", &self.monitor.pages_out_key)?;
        if self.monitor.pages_in_key == self.monitor.pages_out_key {
            return Err(HddError::InvalidConfig {
                details: format!(
                    "monitor.pages_in_key and monitor.pages_out_key must differ, both are {:?}",
                    self.monitor.pages_in_key
                ),
            });
        }

        if self.monitor.counter_source.as_os_str().is_empty() {
            return Err(HddError::InvalidConfig {
                details: "monitor.counter_source must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_key(name: &str, key: &str) -> Result<()> {
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(HddError::InvalidConfig {
            details: format!("{name} must be a single non-empty token, got {key:?}"),
        });
    }
    Ok(())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| HddError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_u32(name: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|error| HddError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
