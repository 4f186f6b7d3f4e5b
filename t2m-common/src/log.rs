//! Narrow logging capability shared by the stream client and the pipeline.
//!
//! The stream client speaks a syslog-like vocabulary (`notice`, `critical`) that
//! `tracing` does not have. [`TracingLogger`] renames those onto `tracing` levels
//! and otherwise delegates without buffering or filtering:
//!
//! | `Logger` method | `tracing` level |
//! |-----------------|-----------------|
//! | `debug`         | DEBUG           |
//! | `info`          | INFO            |
//! | `notice`        | INFO            |
//! | `warning`       | WARN            |
//! | `error`         | ERROR           |
//! | `critical`      | ERROR           |
use std::fmt;

/// Severity-named logging sink. Object safe; shared as `Arc<dyn Logger>`.
///
/// ```
/// use t2m_common::log::{Logger, TracingLogger};
///
/// let log = TracingLogger::new();
/// log.notice(format_args!("Streaming tweets"));
/// log.critical(format_args!("Failed to save tweet #{}: {}", "42", "timeout"));
/// ```
pub trait Logger: Send + Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn info(&self, args: fmt::Arguments<'_>);
    fn notice(&self, args: fmt::Arguments<'_>);
    fn warning(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
    fn critical(&self, args: fmt::Arguments<'_>);
}

/// [`Logger`] adapter over the global `tracing` dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!("{}", args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!("{}", args);
    }

    fn notice(&self, args: fmt::Arguments<'_>) {
        tracing::info!("{}", args);
    }

    fn warning(&self, args: fmt::Arguments<'_>) {
        tracing::warn!("{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!("{}", args);
    }

    fn critical(&self, args: fmt::Arguments<'_>) {
        tracing::error!("{}", args);
    }
}
