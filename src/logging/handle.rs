use std::{fmt, path::PathBuf};

use tracing_appender::non_blocking::WorkerGuard;

/// Дескриптор инициализированного логирования.
///
/// Держит guard файлового писателя: пока дескриптор жив, фоновый поток
/// дописывает записи в файл. При уничтожении буфер сбрасывается.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingHandle {
    pub fn new(
        file_guard: Option<WorkerGuard>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            file_guard,
            log_dir,
        }
    }

    /// Включён ли файловый вывод.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref()
    }

    /// Сбрасывает буферы и завершает фоновый писатель.
    pub fn shutdown(mut self) {
        if let Some(guard) = self.file_guard.take() {
            tracing::debug!("Flushing file log sink");
            drop(guard);
        }
    }
}

impl fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .field("log_dir", &self.log_dir)
            .finish()
    }
}
