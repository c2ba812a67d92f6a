use std::path::Path;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, registry::LookupSpan, Layer};

/// Файловый слой с ежедневной ротацией и неблокирующей записью.
///
/// Возвращённый [`WorkerGuard`] нужно держать, пока идёт запись.
pub fn layer<S>(
    dir: &Path,
    file_prefix: &str,
) -> (Box<dyn Layer<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = rolling::daily(dir, file_prefix);
    let (writer, guard) = non_blocking(appender);

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer);

    (Box::new(layer), guard)
}
