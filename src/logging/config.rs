use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::LoggingError;

/// Переменная окружения с уровнем логирования.
pub const ENV_LOG_LEVEL: &str = "EXTNODE_LOG_LEVEL";

/// Переменная окружения с каталогом файловых логов.
pub const ENV_LOG_DIR: &str = "EXTNODE_LOG_DIR";

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Формат вывода в консоль.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный человекочитаемый формат
    Pretty,
    /// Однострочный формат
    #[default]
    Compact,
    /// Одна JSON-запись на строку
    Json,
}

/// Настройки логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`trace` ... `error`)
    pub level: String,
    /// Дополнительные директивы `EnvFilter`, например `extnode::network=trace`
    pub directives: Vec<String>,
    pub console_enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    /// Каталог для файловых логов; `None` отключает файловый вывод
    pub log_dir: Option<PathBuf>,
    /// Префикс имени файла (к нему добавляется дата)
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            console_enabled: true,
            format: LogFormat::default(),
            with_ansi: true,
            with_target: true,
            log_dir: None,
            file_prefix: "extnode.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Применяет `EXTNODE_LOG_LEVEL` и `EXTNODE_LOG_DIR`, если они заданы.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                self.level = level.to_lowercase();
            }
        }
        if let Ok(dir) = env::var(ENV_LOG_DIR) {
            if !dir.is_empty() {
                self.log_dir = Some(PathBuf::from(dir));
            }
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.log_dir.is_some() && self.file_prefix.is_empty() {
            return Err(LoggingError::InvalidConfig(
                "file_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Создаёт каталог для файловых логов, если он задан.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if let Some(dir) = &self.log_dir {
            fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Директива фильтра: уровень по умолчанию плюс уточнения.
    pub fn filter_directive(&self) -> String {
        let mut out = self.level.clone();
        for d in &self.directives {
            out.push(',');
            out.push_str(d);
        }
        out
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::InvalidConfig(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}
