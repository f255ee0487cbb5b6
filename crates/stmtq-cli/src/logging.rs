//! Logging setup for the stmtq binary
//!
//! Human-readable output goes to stderr so stdout stays clean for JSON
//! results. A JSON file layer with daily rotation can be added for bug reports.
//! `RUST_LOG` overrides the default filter.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for JSON log files; `None` disables the file layer
    pub log_dir: Option<PathBuf>,

    pub enable_console_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            enable_console_logs: true,
            include_location: cfg!(debug_assertions),
            default_filter: "warn,stmtq=info,stmtq_query=info,stmtq_driver_mysql=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose logging: every executed statement and its rendered form
    pub fn verbose() -> Self {
        Self {
            default_filter: "info,stmtq=debug,stmtq_query=debug,stmtq_driver_mysql=debug,stmtq_core=debug"
                .to_string(),
            ..Self::default()
        }
    }

    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>) -> Self {
        self.log_dir = log_dir;
        self
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer; keep it alive until exit.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let mut layers = Vec::new();
    let mut guard = None;

    if config.enable_console_logs {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .with_filter(env_filter.clone())
            .boxed();
        layers.push(console_layer);
    }

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "stmtq.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = ?config.log_dir,
        console_enabled = config.enable_console_logs,
        "Logging system initialized"
    );
    Ok(guard)
}
