use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::Role;

/// Environment variable prefix (`PROCTOR__SERVICE__HTTP__PORT=8080`)
const ENV_PREFIX: &str = "PROCTOR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub streaming: StreamingConfig,
    pub violations: ViolationConfig,
    pub signaling: SignalingConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "proctor-monitor".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

/// Where uploaded segment bytes live while retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub storage: StorageKind,

    /// Spool directory for `storage = "disk"`
    pub spool_dir: PathBuf,

    /// Segments older than this (relative to the newest arrival) are pruned
    pub retention_secs: u64,

    /// Sessions without uploads for this long are evicted by the sweep
    pub inactivity_secs: u64,

    /// A session counts as "currently streaming" if it uploaded within this window
    pub active_window_secs: u64,

    pub sweep_interval_secs: u64,

    /// Per-upload size cap in bytes
    pub max_segment_bytes: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Memory,
            spool_dir: PathBuf::from("uploads"),
            retention_secs: 30,
            inactivity_secs: 60,
            active_window_secs: 10,
            sweep_interval_secs: 60,
            max_segment_bytes: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

impl StreamingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViolationConfig {
    /// Capacity of the per-session recent violation log
    pub history_limit: usize,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self { history_limit: 50 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub heartbeat_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self { heartbeat_secs: 30 }
    }
}

impl SignalingConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

/// A bearer token and the identity it resolves to
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

impl Config {
    /// Load configuration: defaults, then the optional file, then `PROCTOR__*` env vars
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
