//! Process-wide logging setup.
//!
//! Log lines go to stderr, plain or JSON, keeping stdout free for command
//! output. Dependencies known to be chatty are held at WARN (or quieter)
//! whatever the requested level.

use anyhow::{Context, Result, anyhow};
use log::debug;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::Metadata;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{FilterFn, filter_fn};
use tracing_subscriber::prelude::*;

use crate::runtime::Runtime;

pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const LOG_JSON_ENV: &str = "LOG_JSON";

/// Targets capped at WARN to keep routine logs readable.
pub const KNOWN_VERBOSE_TARGETS: [&str; 8] = [
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
    "h2",
    "mio",
    "tokio_util",
    "want",
];

/// Ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    /// Case-insensitive; also accepts `WARNING` and `CRITICAL`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "critical" => Ok(LogLevel::Error),
            other => Err(anyhow!(
                "Unknown log level {:?}, expected one of trace, debug, info, warn, error",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogSettings {
    pub level: LogLevel,
    pub json: bool,
}

impl LogSettings {
    /// Explicit values win; otherwise `LOG_LEVEL` / `LOG_JSON` are consulted,
    /// then the defaults (INFO, plain text).
    pub fn resolve<R: Runtime + ?Sized>(
        runtime: &R,
        level: Option<LogLevel>,
        json: Option<bool>,
    ) -> Result<Self> {
        let level = match level {
            Some(level) => level,
            None => match runtime.env_var(LOG_LEVEL_ENV) {
                Ok(value) => value
                    .parse()
                    .with_context(|| format!("Invalid {} environment variable", LOG_LEVEL_ENV))?,
                Err(_) => LogLevel::default(),
            },
        };

        let json = match json {
            Some(json) => json,
            None => match runtime.env_var(LOG_JSON_ENV) {
                Ok(value) => parse_flag(&value)
                    .with_context(|| format!("Invalid {} environment variable", LOG_JSON_ENV))?,
                Err(_) => false,
            },
        };

        Ok(Self { level, json })
    }

    /// Filter directives: the global level, then one cap per verbose target.
    pub fn directives(&self) -> String {
        let capped = self.level.max(LogLevel::Warn);
        std::iter::once(self.level.to_string())
            .chain(
                KNOWN_VERBOSE_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, capped)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.directives())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    let number: i64 = value
        .trim()
        .parse()
        .with_context(|| format!("Expected an integer flag, got {:?}", value))?;
    Ok(number != 0)
}

/// Number of `with_logging_disabled` calls in progress, on any thread.
static SUPPRESSED: AtomicUsize = AtomicUsize::new(0);

/// Installs the global subscriber described by `settings`.
///
/// A subscriber that is already installed is left in place.
pub fn configure_logging(settings: LogSettings) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    let fmt_layer = if settings.json {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };

    let result = tracing_subscriber::registry()
        .with(settings.filter())
        .with(suppression_gate())
        .with(fmt_layer)
        .try_init();

    if let Err(e) = result {
        debug!("Logging already configured, keeping it: {}", e);
    }
}

/// Runs `f` with logging suppressed for the whole process.
///
/// The subscriber installed by [`configure_logging`] drops every line from
/// every thread until `f` returns. The calling thread's dispatcher is also
/// swapped out, which covers subscribers installed some other way.
pub fn with_logging_disabled<T>(f: impl FnOnce() -> T) -> T {
    let _suppression = Suppression::begin();
    tracing::subscriber::with_default(tracing::subscriber::NoSubscriber::default(), f)
}

/// Whether a [`with_logging_disabled`] call is running anywhere.
pub fn logging_suppressed() -> bool {
    SUPPRESSED.load(Ordering::SeqCst) > 0
}

fn suppression_gate() -> FilterFn<fn(&Metadata<'_>) -> bool> {
    filter_fn(|_| !logging_suppressed())
}

/// Counts as one suppression until dropped, panics included.
struct Suppression;

impl Suppression {
    fn begin() -> Self {
        SUPPRESSED.fetch_add(1, Ordering::SeqCst);
        Suppression
    }
}

impl Drop for Suppression {
    fn drop(&mut self) {
        SUPPRESSED.fetch_sub(1, Ordering::SeqCst);
    }
}
