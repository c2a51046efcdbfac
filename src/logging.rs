use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize structured logging system
///
/// `RUST_LOG` wins over `log_level`. Console output goes to stderr so stdout
/// stays clean for generated SQL. When `log_file` is set, a daily rolling
/// JSON log is written next to it; keep the returned guard alive until exit
/// or buffered lines are lost.
pub fn init_logging(
    log_level: Option<&str>,
    log_file: Option<&Path>,
    json_console: bool,
) -> Result<Option<WorkerGuard>> {
    // Set up environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))
        .context("Failed to create log filter")?;

    // Console layer, plain or JSON
    let (text_layer, json_layer) = if json_console {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .json();
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);
        (Some(layer), None)
    };

    // Add file layer if log file is specified
    let (file_layer, guard) = match log_file {
        Some(log_path) => {
            let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
            let name = log_path
                .file_name()
                .map_or_else(|| "nl2sql.log".into(), |n| n.to_string_lossy().into_owned());
            let (writer, guard) = non_blocking(rolling::daily(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Logging already initialized")?;

    info!("Logging system initialized");
    Ok(guard)
}

/// Performance timing utilities
pub struct OperationTimer {
    operation: &'static str,
    start: std::time::Instant,
    finished: bool,
}

impl OperationTimer {
    /// Start timing `operation`
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: std::time::Instant::now(),
            finished: false,
        }
    }

    /// Log the elapsed time and return it
    pub fn finish(mut self) -> std::time::Duration {
        self.finished = true;
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = self.operation,
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Operation completed"
        );
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() {
            tracing::debug!(
                operation = self.operation,
                duration_ms = self.start.elapsed().as_secs_f64() * 1000.0,
                "Operation abandoned"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_timer_measures() {
        let timer = OperationTimer::new("rank");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.finish() >= std::time::Duration::from_millis(2));
    }
}
