use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::platform;
use crate::types::errors::ConfigError;

/// Retention window used when nothing has been persisted yet.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 7;

/// Debounce delay between the first mutation and the write-back.
pub const DEFAULT_SAVE_DELAY_MS: u64 = 2000;

/// Which storage format the history is persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Json,
    Sqlite,
}

impl BackendKind {
    /// File name used inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            BackendKind::Json => "history.json",
            BackendKind::Sqlite => "history.db",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "sqlite" => {
                if cfg!(feature = "sqlite") {
                    Ok(BackendKind::Sqlite)
                } else {
                    Err(ConfigError::UnsupportedBackend(s.to_string()))
                }
            }
            other => Err(ConfigError::Invalid(format!("unknown backend '{}'", other))),
        }
    }
}

/// Settings for the history store and its persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    pub save_delay_ms: u64,
    pub default_max_age_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: platform::get_data_dir(),
            backend: BackendKind::Json,
            save_delay_ms: DEFAULT_SAVE_DELAY_MS,
            default_max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }
}

impl HistoryConfig {
    /// Builds the config from defaults overridden by `VISITLOG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`HistoryConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("VISITLOG_DATA_DIR") {
            if dir.trim().is_empty() {
                return Err(ConfigError::Invalid("VISITLOG_DATA_DIR is empty".to_string()));
            }
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(backend) = lookup("VISITLOG_BACKEND") {
            config.backend = backend.parse()?;
        }

        if let Some(delay) = lookup("VISITLOG_SAVE_DELAY_MS") {
            config.save_delay_ms = delay.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("VISITLOG_SAVE_DELAY_MS must be an integer: {}", delay))
            })?;
        }

        Ok(config)
    }

    /// Full path of the persisted history file.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(self.backend.file_name())
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }
}
