use env_logger::Builder;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::LogLevel;
use crate::error::{AgentError, Result};

/// Environment variable holding an `env_logger` filter spec that overrides the configured level
pub const LOG_FILTER_ENV: &str = "HOSTPULSE_LOG";

/// Initialize the process-wide logging backend
pub fn init(level: &LogLevel) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level_filter(level));

    if let Ok(spec) = std::env::var(LOG_FILTER_ENV) {
        builder.parse_filters(&spec);
    }

    builder
        .try_init()
        .map_err(|e| AgentError::Other(format!("Failed to initialise logging: {}", e)))
}

fn level_filter(level: &LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Forwards records to whatever logger is installed with the `log` facade
struct GlobalSink;

impl Log for GlobalSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            log::logger().log(record);
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Logging capability handed to each component at construction.
///
/// Components never reach for the global `log` macros; they log through the
/// handle they were given. The default handle forwards to the `log` facade,
/// tests swap in a [`MemorySink`].
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    target: String,
}

impl Logger {
    /// A logger that forwards to the global `log` facade
    pub fn global(target: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(GlobalSink),
            target: target.into(),
        }
    }

    /// A logger writing to an explicit sink
    pub fn with_sink(sink: Arc<dyn Log>, target: impl Into<String>) -> Self {
        Self {
            sink,
            target: target.into(),
        }
    }

    /// Derive a logger for a sub-component, e.g. `hostpulse::runner::cpu`
    pub fn scoped(&self, name: &str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            target: format!("{}::{}", self.target, name),
        }
    }

    /// The log target records are emitted under
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder()
            .level(level)
            .target(&self.target)
            .build();
        if !self.sink.enabled(&metadata) {
            return;
        }
        self.sink.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}

/// A captured log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// In-memory sink that keeps every record, used to assert on log output
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<CapturedRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records at `level` whose message contains `needle`
    pub fn matching(&self, level: Level, needle: &str) -> Vec<CapturedRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.message.contains(needle))
            .collect()
    }
}

impl Log for MemorySink {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedRecord {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            });
    }

    fn flush(&self) {}
}
