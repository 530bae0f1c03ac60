//! Pluggable session logging.
//!
//! Every session carries a `Logger`: a replaceable sink plus an integer severity threshold.
//! Records are formatted at the call site and handed to the sink as a `LogRecord`, so sinks
//! never deal with format strings. The default sink forwards into `tracing`.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Environment variable that overrides the configured log threshold.
pub const LOG_ENV: &str = "DBGNOC_LOG";

/// Record severity, numbered like syslog (lower is more severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Priority {
    /// Operation failures.
    Error = 3,
    /// Recoverable anomalies (dropped frames, stale responses).
    Warning = 4,
    /// Significant lifecycle events.
    Notice = 5,
    /// Connection and discovery progress.
    Info = 6,
    /// Per-request detail.
    Debug = 7,
}

impl Priority {
    /// Numeric syslog value.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Parses a threshold given as a number or a level name.
///
/// # Examples
///
/// ```
/// use dbgnoc_host::log::parse_priority;
///
/// assert_eq!(parse_priority("debug"), Some(7));
/// assert_eq!(parse_priority("4"), Some(4));
/// assert_eq!(parse_priority("loud"), None);
/// ```
pub fn parse_priority(text: &str) -> Option<i32> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i32>() {
        return Some(value);
    }
    let priority = match text.to_ascii_lowercase().as_str() {
        "err" | "error" => Priority::Error,
        "warn" | "warning" => Priority::Warning,
        "notice" => Priority::Notice,
        "info" => Priority::Info,
        "debug" => Priority::Debug,
        _ => return None,
    };
    Some(priority.as_i32())
}

/// One formatted log record as delivered to a sink.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    /// Severity of the record.
    pub priority: Priority,
    /// Source file of the emitting code.
    pub file: &'static str,
    /// Source line of the emitting code.
    pub line: u32,
    /// Module path of the emitting code.
    pub function: &'static str,
    /// Fully formatted message.
    pub message: &'a str,
}

/// Destination for session log records.
pub trait LogSink: Send + Sync {
    /// Consumes one record that passed the session threshold.
    fn log(&self, record: &LogRecord<'_>);
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord<'_>) + Send + Sync,
{
    fn log(&self, record: &LogRecord<'_>) {
        self(record);
    }
}

/// Default sink: re-emits records as `tracing` events under the `dbgnoc` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, r: &LogRecord<'_>) {
        match r.priority {
            Priority::Error => {
                tracing::error!(target: "dbgnoc", file = r.file, line = r.line, "{}", r.message);
            }
            Priority::Warning => {
                tracing::warn!(target: "dbgnoc", file = r.file, line = r.line, "{}", r.message);
            }
            Priority::Notice | Priority::Info => {
                tracing::info!(target: "dbgnoc", file = r.file, line = r.line, "{}", r.message);
            }
            Priority::Debug => {
                tracing::debug!(target: "dbgnoc", file = r.file, line = r.line, "{}", r.message);
            }
        }
    }
}

/// Sink and threshold shared by a session and its collector thread.
pub struct Logger {
    sink: RwLock<Arc<dyn LogSink>>,
    threshold: AtomicI32,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("threshold", &self.threshold())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Creates a logger with the tracing sink and the given threshold.
    pub fn new(threshold: i32) -> Self {
        Self {
            sink: RwLock::new(Arc::new(TracingSink)),
            threshold: AtomicI32::new(threshold),
        }
    }

    /// Creates a logger whose threshold comes from `DBGNOC_LOG`, else `configured`, else errors only.
    pub fn from_env(configured: Option<i32>) -> Self {
        let threshold = std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| parse_priority(&v))
            .or(configured)
            .unwrap_or(Priority::Error.as_i32());
        Self::new(threshold)
    }

    /// Current threshold.
    pub fn threshold(&self) -> i32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Replaces the threshold.
    pub fn set_threshold(&self, threshold: i32) {
        self.threshold.store(threshold, Ordering::Relaxed);
    }

    /// Replaces the sink; records already in flight finish on the old one.
    pub fn set_sink(&self, sink: Arc<dyn LogSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// Returns `true` if records of `priority` pass the threshold.
    pub fn enabled(&self, priority: Priority) -> bool {
        priority.as_i32() <= self.threshold()
    }

    /// Formats and delivers one record if it passes the threshold.
    ///
    /// Called through the crate's logging macros, which fill in the source location.
    pub fn log(
        &self,
        priority: Priority,
        file: &'static str,
        line: u32,
        function: &'static str,
        args: fmt::Arguments<'_>,
    ) {
        if !self.enabled(priority) {
            return;
        }
        let message = args.to_string();
        let sink = Arc::clone(&self.sink.read().unwrap_or_else(PoisonError::into_inner));
        sink.log(&LogRecord {
            priority,
            file,
            line,
            function,
            message: &message,
        });
    }
}

/// Emits a record through a `Logger` at the given priority, capturing the source location.
macro_rules! log_at {
    ($logger:expr, $priority:expr, $($arg:tt)+) => {
        $logger.log(
            $priority,
            file!(),
            line!(),
            module_path!(),
            format_args!($($arg)+),
        )
    };
}

macro_rules! log_err {
    ($logger:expr, $($arg:tt)+) => { $crate::log::log_at!($logger, $crate::log::Priority::Error, $($arg)+) };
}

macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => { $crate::log::log_at!($logger, $crate::log::Priority::Warning, $($arg)+) };
}

macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => { $crate::log::log_at!($logger, $crate::log::Priority::Info, $($arg)+) };
}

macro_rules! log_dbg {
    ($logger:expr, $($arg:tt)+) => { $crate::log::log_at!($logger, $crate::log::Priority::Debug, $($arg)+) };
}

pub(crate) use {log_at, log_dbg, log_err, log_info, log_warn};
