use crate::build_info;
use crate::cli::RunMode;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// HTTP client internals are only interesting when asked for through `RUST_LOG`.
const QUIET_DEPENDENCIES: &str = "hyper=warn,reqwest=warn,tokio_postgres=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Anything other than `text` means JSON.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "text" => Self::Text,
            _ => Self::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

/// `LOG_FORMAT` and `LOG_LEVEL`; `RUST_LOG` still wins over the level when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub default_level: String,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            format: LogFormat::parse(lookup("LOG_FORMAT").as_deref()),
            default_level: lookup("LOG_LEVEL")
                .map(|level| level.trim().to_ascii_lowercase())
                .filter(|level| !level.is_empty())
                .unwrap_or_else(|| "info".to_string()),
        }
    }

    fn filter_directives(&self) -> String {
        format!("{},{QUIET_DEPENDENCIES}", self.default_level)
    }
}

/// Fields every run is tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingContext {
    pub service: &'static str,
    pub mode: RunMode,
    pub run_id: String,
    pub format: LogFormat,
}

/// Installs the process-wide subscriber and emits one `logging_initialized` event.
///
/// `log` records from diesel and reqwest are bridged into `tracing`.
pub fn init_logging(service: &'static str, mode: RunMode, settings: &LogSettings) -> LoggingContext {
    let context = LoggingContext {
        service,
        mode,
        run_id: build_run_id(service),
        format: settings.format,
    };

    let _ = LogTracer::init();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter_directives()));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let _ = match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().flatten_event(true))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init(),
    };

    tracing::info!(
        event = "logging_initialized",
        service = context.service,
        mode = context.mode.as_str(),
        run_id = %context.run_id,
        build_version = build_info::VERSION,
        build_commit = build_info::short_commit_hash(),
        log_format = context.format.as_str(),
        "initialized logging"
    );

    context
}

fn build_run_id(service: &str) -> String {
    let epoch_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or_default();
    format!("{service}-{}-{epoch_millis}", process::id())
}

/// Renders an error with its numbered source chain and a backtrace taken here.
pub fn format_error_report(err: &(dyn StdError + 'static)) -> String {
    let mut report = format!("error: {err}");

    let causes = std::iter::successors(err.source(), |&source| source.source());
    for (idx, cause) in causes.enumerate() {
        let _ = write!(report, "\ncaused by ({}): {cause}", idx + 1);
    }

    let _ = write!(report, "\nbacktrace:\n{}", Backtrace::force_capture());
    report
}
