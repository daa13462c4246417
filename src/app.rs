//! Application context for visitlog.
//!
//! Builds the one history store the process uses and hands it to
//! collaborators. There is no global instance.

use std::sync::Arc;

use tracing::info;

use crate::managers::history_store::HistoryStore;
#[cfg(feature = "sqlite")]
use crate::services::history_persistence::SqliteBackend;
use crate::services::executor::{TokioExecutor, TokioTimer};
use crate::services::history_persistence::{HistoryBackend, JsonFileBackend, MemoryBackend};
use crate::types::config::{BackendKind, HistoryConfig};
#[cfg(not(feature = "sqlite"))]
use crate::types::errors::ConfigError;
#[cfg(feature = "sqlite")]
use crate::types::errors::HistoryError;

/// Central struct holding the history store and the config it was built from.
pub struct App {
    pub config: HistoryConfig,
    pub history: Arc<HistoryStore>,
}

impl App {
    /// Creates an App persisting to the backend named by `config`.
    ///
    /// Timers and background writes run on the given tokio runtime.
    pub fn new(
        config: HistoryConfig,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = open_backend(&config)?;
        info!(
            path = %config.history_path().display(),
            backend = ?config.backend,
            "opening history"
        );
        Ok(Self::with_backend(config, backend, runtime))
    }

    /// Creates an App whose history is never written to disk.
    pub fn ephemeral(config: HistoryConfig, runtime: tokio::runtime::Handle) -> Self {
        Self::with_backend(config, Arc::new(MemoryBackend::new()), runtime)
    }

    pub fn with_backend(
        config: HistoryConfig,
        backend: Arc<dyn HistoryBackend>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let history = HistoryStore::builder(backend)
            .timer(Arc::new(TokioTimer::new(runtime.clone())))
            .executor(Arc::new(TokioExecutor::new(runtime)))
            .save_delay(config.save_delay())
            .default_max_age_days(config.default_max_age_days)
            .build();

        Self {
            config,
            history: Arc::new(history),
        }
    }

    /// Shutdown sequence: write the final history snapshot.
    pub fn shutdown(&self) {
        if self.history.shutdown() {
            info!("history flushed");
        }
    }
}

fn open_backend(config: &HistoryConfig) -> Result<Arc<dyn HistoryBackend>, Box<dyn std::error::Error>> {
    let path = config.history_path();
    match config.backend {
        BackendKind::Json => Ok(Arc::new(JsonFileBackend::new(path))),
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(HistoryError::from)?;
            }
            Ok(Arc::new(SqliteBackend::open(&path)?))
        }
        #[cfg(not(feature = "sqlite"))]
        BackendKind::Sqlite => Err(Box::new(ConfigError::UnsupportedBackend("sqlite".to_string()))),
    }
}
