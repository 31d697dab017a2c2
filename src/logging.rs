use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, bail};
use tracing::Subscriber;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LoggingConfig, LoggingRotation};

const LOG_FILE_PREFIX: &str = "debug_genie.log";

/// Flushes buffered log lines when dropped. Hold it until `main` returns.
pub struct LoggingGuard {
    _flush_on_drop: WorkerGuard,
}

/// Installs the global subscriber: JSON lines into a rotating file, plus warnings on stderr.
/// Expired files are purged first so the new run starts with a bounded directory.
pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = build_env_filter(&config.filter)?;
    let dir = resolve_log_dir(&config.dir)?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let purge = purge_expired_logs(&dir, LOG_FILE_PREFIX, config.retention_days, SystemTime::now());

    let appender = match config.rotation {
        LoggingRotation::Daily => rolling::daily(&dir, LOG_FILE_PREFIX),
        LoggingRotation::Hourly => rolling::hourly(&dir, LOG_FILE_PREFIX),
    };
    let (writer, flush_on_drop) = tracing_appender::non_blocking(appender);

    let warnings_to_stderr = config
        .stderr_warn_enabled
        .then(|| fmt::layer().with_writer(io::stderr).with_filter(LevelFilter::WARN));

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(json_file_layer(writer).with_filter(filter))
        .with(warnings_to_stderr)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        target: "logging",
        dir = %dir.display(),
        filter = %config.filter,
        rotation = ?config.rotation,
        retention_days = config.retention_days,
        purged_files = purge.removed,
        "logging_initialized"
    );
    for warning in &purge.warnings {
        tracing::warn!(target: "logging", detail = %warning, "log_purge_incomplete");
    }

    Ok(LoggingGuard { _flush_on_drop: flush_on_drop })
}

/// One JSON object per event, carrying the enclosing `rca` span so every line has its run id.
fn json_file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_span_list(false)
        .with_ansi(false)
        .with_writer(writer)
}

fn build_env_filter(directives: &str) -> Result<EnvFilter> {
    if directives.trim().is_empty() {
        bail!("logging.filter must name at least one directive");
    }
    EnvFilter::try_new(directives)
        .with_context(|| format!("logging.filter '{directives}' is not a valid filter"))
}

fn resolve_log_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("cannot resolve relative logging.dir")?;
        Ok(cwd.join(dir))
    }
}

#[derive(Debug, Default)]
struct PurgeOutcome {
    removed: usize,
    warnings: Vec<String>,
}

/// Removes `prefix*` files whose mtime is at or before `now - retention_days`.
/// Problems become warnings; they never fail startup.
fn purge_expired_logs(
    log_dir: &Path,
    prefix: &str,
    retention_days: usize,
    now: SystemTime,
) -> PurgeOutcome {
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    let window = DAY.saturating_mul(u32::try_from(retention_days).unwrap_or(u32::MAX));
    let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut outcome = PurgeOutcome::default();

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            outcome
                .warnings
                .push(format!("cannot list {}: {err}", log_dir.display()));
            return outcome;
        }
    };

    let candidates = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix));
    for entry in candidates {
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(err) => {
                outcome.warnings.push(format!("cannot stat {}: {err}", path.display()));
                continue;
            }
        };
        let expired = metadata
            .modified()
            .map(|modified| modified <= cutoff)
            .unwrap_or(false);
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => outcome.removed += 1,
            Err(err) => outcome
                .warnings
                .push(format!("cannot remove {}: {err}", path.display())),
        }
    }

    outcome
}
