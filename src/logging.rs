/// File logging.
///
/// Logs go to `{data_dir}/logs/mrooms.log`; terminal output stays free of log
/// lines. Each run appends to the file after a separator line.
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "mrooms.log";

/// Installs the global subscriber and returns the log file path.
///
/// The filter defaults to `info,matrix_sdk=warn` and can be overridden with
/// `RUST_LOG`. Calling this again keeps the first subscriber.
pub fn init_logging(data_dir: &Path, user_id: &str) -> Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,matrix_sdk=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .ok();

    let log_path = log_dir.join(LOG_FILE);
    write_separator(&log_path, user_id)?;
    tracing::info!("Logging initialized for {}", user_id);

    Ok(log_path)
}

fn write_separator(log_path: &Path, user_id: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;
    writeln!(
        file,
        "\n{sep}\n[{ts}] New session: {user}\n{sep}",
        sep = "=".repeat(80),
        ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        user = user_id
    )?;
    Ok(())
}
