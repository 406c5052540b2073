// Execution context shared read-only by every state
//
// The logger routes each call explicitly: developer lines go to `tracing`,
// user lines go to the sink fixed at construction.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::shutdown::ShutdownSignal;

/// Where a log call is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Dev,
    User,
    Both,
}

impl LogTarget {
    fn includes_dev(self) -> bool {
        matches!(self, LogTarget::Dev | LogTarget::Both)
    }

    fn includes_user(self) -> bool {
        matches!(self, LogTarget::User | LogTarget::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Destination of operator-facing messages
pub trait UserSink: Send + Sync {
    fn deliver(&self, level: LogLevel, message: &str) -> io::Result<()>;
}

/// Prints `[LEVEL] message` to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl UserSink for ConsoleSink {
    fn deliver(&self, level: LogLevel, message: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "[{level}] {message}")?;
        out.flush()
    }
}

/// Process-scoped logging service
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn UserSink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    pub fn new(sink: Arc<dyn UserSink>) -> Self {
        Self { sink }
    }

    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleSink))
    }

    pub fn info(&self, target: LogTarget, message: &str) {
        self.log(LogLevel::Info, target, message);
    }

    pub fn warn(&self, target: LogTarget, message: &str) {
        self.log(LogLevel::Warn, target, message);
    }

    pub fn error(&self, target: LogTarget, message: &str) {
        self.log(LogLevel::Error, target, message);
    }

    pub fn critical(&self, target: LogTarget, message: &str) {
        self.log(LogLevel::Critical, target, message);
    }

    pub fn log(&self, level: LogLevel, target: LogTarget, message: &str) {
        if target.includes_dev() {
            match level {
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
                LogLevel::Critical => error!(severity = "critical", "{}", message),
            }
        }
        if target.includes_user() {
            if let Err(e) = self.sink.deliver(level, message) {
                warn!(error = %e, "Failed to deliver user message");
            }
        }
    }
}

/// Immutable handle passed by reference into every state call
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub config: Arc<AppConfig>,
    pub logger: Logger,
    pub shutdown: ShutdownSignal,
}

impl ExecutionContext {
    pub fn new(config: AppConfig, logger: Logger, shutdown: ShutdownSignal) -> Self {
        Self {
            config: Arc::new(config),
            logger,
            shutdown,
        }
    }
}
