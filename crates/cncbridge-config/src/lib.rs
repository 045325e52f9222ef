//! Configuration for the cncbridge agent.
//!
//! A TOML or YAML file merged with `CNCBRIDGE_*` environment variables,
//! defaults for everything but the device list, and translation to
//! `cncbridge_core::BridgeConfig`. The core crate never reads files; this
//! crate is the only place that does.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml, Yaml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cncbridge_core::config::DEFAULT_LEDGER_FILE;
use cncbridge_core::{BridgeConfig, CoreError, DeclaredType, Device, TagPack, Timing};
use cncbridge_driver::{Status, StatusPolicy};

/// Prefix for environment overrides; `__` separates nesting levels, e.g.
/// `CNCBRIDGE_TIMING__MAX_RECONNECT=3`.
pub const ENV_PREFIX: &str = "CNCBRIDGE_";

const DEFAULT_PORT: u16 = 8193;
const DEFAULT_DELAY_MS: u64 = 1000;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config structs ──────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Where unreleased handles are recorded across restarts. Relative
    /// paths are resolved against the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Named tag packs: full tag name → declared type.
    #[serde(default)]
    pub tag_packs: IndexMap<String, TagPack>,
}

/// Backoffs and retry limits. Durations are in milliseconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_release_timeout_ms")]
    pub release_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_recovery_interval_ms")]
    pub recovery_interval_ms: u64,
    #[serde(default = "default_retry_limit")]
    pub max_connect: u32,
    #[serde(default = "default_retry_limit")]
    pub max_get_handle: u32,
    #[serde(default = "default_retry_limit")]
    pub max_reconnect: u32,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            release_timeout_ms: default_release_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            recovery_interval_ms: default_recovery_interval_ms(),
            max_connect: default_retry_limit(),
            max_get_handle: default_retry_limit(),
            max_reconnect: default_retry_limit(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn to_timing(&self) -> Timing {
        Timing {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            release_timeout: Duration::from_millis(self.release_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            recovery_interval: Duration::from_millis(self.recovery_interval_ms),
            max_connect: self.max_connect,
            max_get_handle: self.max_get_handle,
            max_reconnect: self.max_reconnect,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}
fn default_acquire_timeout_ms() -> u64 {
    10_000
}
fn default_release_timeout_ms() -> u64 {
    10_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_recovery_interval_ms() -> u64 {
    10_000
}
fn default_retry_limit() -> u32 {
    5
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

/// Which status codes are benign on release and fatal on read.
#[derive(Debug, Deserialize, Serialize)]
pub struct StatusConfig {
    #[serde(default = "default_benign_release")]
    pub benign_release: Vec<Status>,
    #[serde(default = "default_fatal")]
    pub fatal: Vec<Status>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            benign_release: default_benign_release(),
            fatal: default_fatal(),
        }
    }
}

fn default_benign_release() -> Vec<Status> {
    StatusPolicy::default().benign_release().to_vec()
}
fn default_fatal() -> Vec<Status> {
    StatusPolicy::default().fatal().to_vec()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Write line-delimited records to stdout.
    #[serde(default = "default_true")]
    pub stdout: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stdout: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Unique display name; defaults to `"Device <index>"`.
    #[serde(default)]
    pub name: String,

    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Pause between poll iterations.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    pub tags_pack_name: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "cncbridge", "cncbridge").map_or_else(
        || PathBuf::from("cncbridge.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load configuration from `path` (TOML, or YAML for `.yaml`/`.yml`) with
/// `CNCBRIDGE_*` environment overrides on top.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let figment = Figment::new().merge(Serialized::defaults(Config::default()));
    let figment = if is_yaml(path) {
        figment.merge(Yaml::file(path))
    } else {
        figment.merge(Toml::file(path))
    };
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Load, translate and validate in one step.
pub fn load_bridge_config(path: &Path) -> Result<(Config, BridgeConfig), ConfigError> {
    let config = load_config(path)?;
    let bridge = config.to_bridge_config(path)?;
    Ok((config, bridge))
}

impl Config {
    /// Effective configuration rendered back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the runtime configuration. `source` is the file this config was
    /// loaded from; it anchors the ledger path.
    pub fn to_bridge_config(&self, source: &Path) -> Result<BridgeConfig, ConfigError> {
        for (index, device) in self.devices.iter().enumerate() {
            if device.address.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("devices[{index}].address"),
                    reason: "must not be empty".into(),
                });
            }
        }

        let devices = self
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| Device {
                name: if d.name.trim().is_empty() {
                    format!("Device {index}")
                } else {
                    d.name.clone()
                },
                address: d.address.clone(),
                port: d.port,
                delay_ms: d.delay_ms,
                tags_pack_name: d.tags_pack_name.clone(),
            })
            .collect();

        let mut bridge = BridgeConfig::new(devices, self.tag_packs.clone());
        bridge.timing = self.timing.to_timing();
        bridge.policy = StatusPolicy::new(
            self.status.benign_release.clone(),
            self.status.fatal.clone(),
        );
        bridge.ledger_path = self.ledger_path(source);
        bridge.validate()?;
        Ok(bridge)
    }

    /// Explicit `ledger_path`, else the default file next to `source`.
    pub fn ledger_path(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        match &self.ledger_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => dir.join(path),
            None => dir.join(DEFAULT_LEDGER_FILE),
        }
    }

    /// Tag names per pack, for summaries.
    pub fn declared_tags(&self, pack: &str) -> Option<Vec<(&str, DeclaredType)>> {
        self.tag_packs
            .get(pack)
            .map(|tags| tags.iter().map(|(k, v)| (k.as_str(), *v)).collect())
    }
}
