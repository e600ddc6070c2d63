//! TOML configuration with environment overrides.
//!
//! Durations are written as humantime strings (`"10h"`, `"30m"`) and parsed
//! into their `Duration` counterparts by [`AppConfig::init`]. Secrets never
//! live in the file: the AppRole secret id and the storage access token come
//! from the environment.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::merger::DEFAULT_CAPACITY;
use crate::retention::DEFAULT_MAX_CONCURRENT_DELETES;

/// Configuration load and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid interval {key} = {value:?}: {message}")]
    InvalidInterval {
        key: &'static str,
        value: String,
        message: String,
    },

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub vault: VaultConf,
    pub storage: StorageConf,
    #[serde(default)]
    pub pipeline: PipelineConf,
    #[serde(default)]
    pub push: PushConf,
    #[serde(default)]
    pub logging: LoggingConf,
    #[serde(default)]
    pub notify: NotifyConf,
    #[serde(default)]
    pub status: StatusConf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConf {
    #[serde(default = "VaultConf::default_address")]
    pub address: String,
    pub app_role_id: String,
    /// Supplied by `APPROLE_SECRET_ID`.
    #[serde(skip)]
    pub app_secret_id: Option<String>,
    /// Websocket base of the event feed. Derived from `address` when unset.
    #[serde(default)]
    pub events_base_url: Option<String>,
    #[serde(default = "VaultConf::default_event_type")]
    pub listened_event_type: String,
    pub snapshot_folder: PathBuf,
    #[serde(rename = "scheduled_snapshot_interval")]
    pub scheduled_snapshot_interval_str: String,
    #[serde(skip)]
    pub scheduled_snapshot_interval: Duration,
}

impl VaultConf {
    pub const ENV_ADDRESS: &'static str = "VAULT_ADDR";
    pub const ENV_SECRET_ID: &'static str = "APPROLE_SECRET_ID";

    fn default_address() -> String {
        "http://127.0.0.1:8200".to_string()
    }

    fn default_event_type() -> String {
        "*".to_string()
    }

    /// Event feed base, falling back to the server address with a ws scheme.
    pub fn events_base_url(&self) -> String {
        match &self.events_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let address = self.address.trim_end_matches('/');
                if let Some(rest) = address.strip_prefix("https://") {
                    format!("wss://{}", rest)
                } else if let Some(rest) = address.strip_prefix("http://") {
                    format!("ws://{}", rest)
                } else {
                    address.to_string()
                }
            }
        }
    }
}

/// KV v2 location of the storage access token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSecretConf {
    #[serde(default = "TokenSecretConf::default_mount")]
    pub mount: String,
    pub path: String,
    #[serde(default = "TokenSecretConf::default_key")]
    pub key: String,
}

impl TokenSecretConf {
    fn default_mount() -> String {
        "secret".to_string()
    }

    fn default_key() -> String {
        "access_token".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConf {
    #[serde(default = "StorageConf::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "StorageConf::default_upload_base_url")]
    pub upload_base_url: String,
    /// Supplied by `DRIVE_ACCESS_TOKEN`.
    #[serde(skip)]
    pub access_token: Option<String>,
    /// Where to read the access token when the environment has none.
    #[serde(default)]
    pub token_secret: Option<TokenSecretConf>,
    pub on_event_deploy_folder_id: String,
    pub scheduled_deploy_folder_id: String,
    pub backup_file_retention_days: u32,
    #[serde(
        rename = "retention_sweep_interval",
        default = "StorageConf::default_sweep_interval"
    )]
    pub retention_sweep_interval_str: String,
    #[serde(skip)]
    pub retention_sweep_interval: Duration,
    #[serde(default = "StorageConf::default_max_concurrent_deletes")]
    pub max_concurrent_deletes: usize,
}

impl StorageConf {
    pub const ENV_ACCESS_TOKEN: &'static str = "DRIVE_ACCESS_TOKEN";

    fn default_api_base_url() -> String {
        "https://www.googleapis.com/drive/v3".to_string()
    }

    fn default_upload_base_url() -> String {
        "https://www.googleapis.com/upload/drive/v3".to_string()
    }

    fn default_sweep_interval() -> String {
        "24h".to_string()
    }

    fn default_max_concurrent_deletes() -> usize {
        DEFAULT_MAX_CONCURRENT_DELETES
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConf {
    #[serde(default = "PipelineConf::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl PipelineConf {
    fn default_queue_capacity() -> usize {
        DEFAULT_CAPACITY
    }
}

impl Default for PipelineConf {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConf {
    /// 0 disables reconnection.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "PushConf::default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl PushConf {
    fn default_max_backoff_secs() -> u64 {
        30
    }
}

impl Default for PushConf {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            max_backoff_secs: Self::default_max_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConf {
    /// Log file. Logs go to stdout when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "LoggingConf::default_level")]
    pub level: String,
}

impl LoggingConf {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConf {
    fn default() -> Self {
        Self {
            file: None,
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConf {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusConf {
    #[serde(default)]
    pub bind: Option<SocketAddr>,
}

fn parse_interval(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidInterval {
        key,
        value: value.to_string(),
        message,
    };
    let interval = humantime::parse_duration(value.trim()).map_err(|e| invalid(e.to_string()))?;
    if interval.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(interval)
}

fn non_empty(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(key))
    } else {
        Ok(())
    }
}

impl AppConfig {
    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut conf = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        conf.apply_env();
        conf.init()?;
        Ok(conf)
    }

    /// Parse without touching the environment or validating.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Apply `VAULT_ADDR`, `APPROLE_SECRET_ID` and `DRIVE_ACCESS_TOKEN`.
    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var(VaultConf::ENV_ADDRESS) {
            if !v.is_empty() {
                self.vault.address = v;
            }
        }
        if let Ok(v) = env::var(VaultConf::ENV_SECRET_ID) {
            self.vault.app_secret_id = Some(v);
        }
        if let Ok(v) = env::var(StorageConf::ENV_ACCESS_TOKEN) {
            if !v.trim().is_empty() {
                self.storage.access_token = Some(v);
            }
        }
    }

    /// Parse intervals and check required settings.
    pub fn init(&mut self) -> Result<(), ConfigError> {
        non_empty("vault.address", &self.vault.address)?;
        non_empty("vault.app_role_id", &self.vault.app_role_id)?;
        if self
            .vault
            .app_secret_id
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigError::Missing(VaultConf::ENV_SECRET_ID));
        }
        non_empty(
            "storage.on_event_deploy_folder_id",
            &self.storage.on_event_deploy_folder_id,
        )?;
        non_empty(
            "storage.scheduled_deploy_folder_id",
            &self.storage.scheduled_deploy_folder_id,
        )?;
        // A blank token counts as no token.
        if self
            .storage
            .access_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.storage.access_token = None;
        }
        if self.storage.access_token.is_none() && self.storage.token_secret.is_none() {
            return Err(ConfigError::Missing(StorageConf::ENV_ACCESS_TOKEN));
        }

        self.vault.scheduled_snapshot_interval = parse_interval(
            "vault.scheduled_snapshot_interval",
            &self.vault.scheduled_snapshot_interval_str,
        )?;
        self.storage.retention_sweep_interval = parse_interval(
            "storage.retention_sweep_interval",
            &self.storage.retention_sweep_interval_str,
        )?;

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "pipeline.queue_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.storage.max_concurrent_deletes == 0 {
            return Err(ConfigError::Invalid {
                key: "storage.max_concurrent_deletes",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.push.max_backoff_secs)
    }
}
