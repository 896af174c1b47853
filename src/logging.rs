use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, bail};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{Config, LoggingRotation};

const LOG_FILE_PREFIX: &str = "analyst.log";

/// Levels for the service's own targets when `logging.filter` does not name
/// them. `model_client` stays at info so per-call debug lines are opt-in.
const TARGET_DEFAULTS: &[(&str, &str)] = &[
    ("analysis", "info"),
    ("model_client", "info"),
    ("server", "info"),
    ("tower_http", "warn"),
];

/// Holds the file writer's worker; dropping it flushes pending lines.
pub struct LoggingGuard {
    _worker_guard: WorkerGuard,
    run_id: String,
}

impl LoggingGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

pub fn init_tracing(config: &Config) -> Result<LoggingGuard> {
    let logging = &config.logging;
    let log_dir = prepare_log_dir(&logging.dir)?;
    let purge = purge_expired_logs(
        &log_dir,
        LOG_FILE_PREFIX,
        logging.retention_days,
        SystemTime::now(),
    );

    let directives = effective_filter(&logging.filter)?;
    let file_filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid logging.filter '{}'", logging.filter))?;

    let appender = RollingFileAppender::new(
        rotation_of(&logging.rotation),
        &log_dir,
        LOG_FILE_PREFIX,
    );
    let (file_writer, worker_guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(file_filter);
    let stderr_layer = logging.stderr_warn_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    let run_id = Uuid::now_v7().to_string();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        log_dir = %log_dir.display(),
        filter = %directives,
        store_url = %config.store.url,
        provider_endpoint = %config.provider.endpoint,
        model = %config.provider.model,
        expired_logs_removed = purge.removed,
        "logging_initialized"
    );
    for warning in purge.warnings {
        tracing::warn!(target: "logging", warning = %warning, "log_retention_warning");
    }

    Ok(LoggingGuard {
        _worker_guard: worker_guard,
        run_id,
    })
}

/// `logging.filter` followed by defaults for every service target it leaves out.
fn effective_filter(filter: &str) -> Result<String> {
    let filter = filter.trim();
    if filter.is_empty() {
        bail!("logging.filter cannot be empty");
    }

    let mut directives = vec![filter.to_string()];
    for (target, level) in TARGET_DEFAULTS {
        if !names_target(filter, target) {
            directives.push(format!("{target}={level}"));
        }
    }
    Ok(directives.join(","))
}

fn names_target(filter: &str, target: &str) -> bool {
    filter.split(',').any(|directive| {
        directive
            .trim()
            .split(['=', '['])
            .next()
            .is_some_and(|name| name == target || name.starts_with(&format!("{target}::")))
    })
}

fn rotation_of(rotation: &LoggingRotation) -> Rotation {
    match rotation {
        LoggingRotation::Daily => Rotation::DAILY,
        LoggingRotation::Hourly => Rotation::HOURLY,
    }
}

fn prepare_log_dir(dir: &Path) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        bail!("logging.dir cannot be empty");
    }
    let log_dir = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to resolve logging.dir against the working directory")?
            .join(dir)
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create logging directory {}", log_dir.display()))?;
    Ok(log_dir)
}

#[derive(Debug, Default)]
struct PurgeReport {
    removed: usize,
    warnings: Vec<String>,
}

/// Removes rotated files older than the retention window. Problems become
/// warnings; startup continues.
fn purge_expired_logs(
    log_dir: &Path,
    prefix: &str,
    retention_days: usize,
    now: SystemTime,
) -> PurgeReport {
    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60) as u64);
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut report = PurgeReport::default();

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            report
                .warnings
                .push(format!("failed to scan {}: {}", log_dir.display(), err));
            return report;
        }
    };

    for entry in entries {
        let path = match entry {
            Ok(entry) if entry.file_name().to_string_lossy().starts_with(prefix) => entry.path(),
            Ok(_) => continue,
            Err(err) => {
                report
                    .warnings
                    .push(format!("failed to iterate {}: {}", log_dir.display(), err));
                continue;
            }
        };

        match is_expired_log(&path, cutoff) {
            Ok(false) => {}
            Ok(true) => match fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(err) => report
                    .warnings
                    .push(format!("failed to remove {}: {}", path.display(), err)),
            },
            Err(err) => report
                .warnings
                .push(format!("failed to stat {}: {}", path.display(), err)),
        }
    }

    report
}

fn is_expired_log(path: &Path, cutoff: SystemTime) -> std::io::Result<bool> {
    let metadata = fs::metadata(path)?;
    Ok(metadata.is_file() && metadata.modified()? <= cutoff)
}
