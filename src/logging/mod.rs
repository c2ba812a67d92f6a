//! Логирование на основе `tracing`.
//!
//! Фильтр `EnvFilter`, консольный слой (pretty / compact / json) и
//! необязательный файловый слой с ежедневной ротацией.

pub mod config;
mod filters;
pub mod handle;
pub mod sinks;

use std::{io, path::PathBuf};

pub use config::{LogFormat, LoggingConfig, ENV_LOG_DIR, ENV_LOG_LEVEL};
pub use handle::LoggingHandle;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Ошибки инициализации логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("Invalid logging config: {0}")]
    InvalidConfig(String),
    #[error("Cannot create log directory {path:?}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Инициализирует глобальный subscriber.
///
/// Повторный вызов в том же процессе возвращает
/// [`LoggingError::AlreadyInitialized`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter(&config);
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_enabled {
        layers.push(sinks::console::layer(&config));
    }

    let file_guard = match config.log_dir() {
        Some(dir) => {
            let (layer, guard) = sinks::file::layer(dir, &config.file_prefix);
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );

    Ok(LoggingHandle::new(file_guard, config.log_dir.clone()))
}
