use std::io;
use std::path::Path;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "livecode";
/// Checked before `RUST_LOG`.
const LOG_ENV: &str = "LIVECODE_LOG";
const DEFAULT_FILTER: &str = "info";

/// Daily-rolled JSON log named after the subcommand, e.g. `livecode-render.log`.
pub(crate) fn log_file_name(command: &str) -> String {
    format!("{LOG_FILE_PREFIX}-{command}.log")
}

pub(crate) fn init_tracing(
    log_dir: &Path,
    command: &str,
    log_to_stderr: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name(command));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .json();
    let stderr_layer = log_to_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(file_guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
