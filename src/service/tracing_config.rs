use std::path::Path;

use dotenv::dotenv;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{AppError, AppResult};

const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Builds an `EnvFilter` from `RUST_LOG`, falling back to the given level.
fn env_filter(default_level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_lowercase()))
}

/// Console-only tracing, used by the cli and by tests.
pub fn setup_local_tracing(default_level: tracing::Level) -> AppResult<()> {
    // 加载 .env 文件
    dotenv().ok();
    let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(default_level))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("setup tracing: {}", e)))
}

/// Console plus an hourly rolling file under `log_dir`.
///
/// The returned guard must be kept alive, dropping it stops the background file writer.
pub fn setup_tracing(
    log_dir: impl AsRef<Path>,
    default_level: tracing::Level,
) -> AppResult<WorkerGuard> {
    dotenv().ok();
    let file_appender = tracing_appender::rolling::hourly(log_dir.as_ref(), "commitlog.log");
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    // 同时写入到控制台和文件
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIMER_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(default_level))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("setup tracing: {}", e)))?;

    Ok(worker_guard)
}
