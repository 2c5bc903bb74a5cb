//! The per-mapping engine log (§L9, §6 "Log record format"): an
//! append-only, level-filtered, rotation-safe text file, independent of
//! the process-wide `tracing` subscriber used by the CLI binaries.
//!
//! Every engine component receives this as an explicit `Arc<dyn EngineLog>`
//! dependency rather than reaching for a global (§9 "Global state").

use crate::model::timestamp::Timestamp;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// 0=err only, 1=+warn, 2=+info, 3=+debug, matching `MappingAttrs::log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Err = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn from_attr(level: u8) -> Self {
        match level {
            0 => LogLevel::Err,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

pub trait EngineLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn err(&self, message: &str) {
        self.log(LogLevel::Err, message);
    }
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
}

struct Inner {
    path: PathBuf,
    file: Option<File>,
}

/// Appends `<UTC yyyy/mm/dd hh:mm:ss> UTC: <message>\n` lines to
/// `repl/log-<mapping>.log`, filtering by `threshold`. Grounded on
/// `Logger.cc`'s `check_log`: before every write, re-stat the path and
/// reopen if the file was removed or replaced out from under the engine
/// (external log rotation).
pub struct FileLogger {
    threshold: LogLevel,
    inner: Mutex<Inner>,
}

impl FileLogger {
    pub fn open(path: impl Into<PathBuf>, threshold: LogLevel) -> std::io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(FileLogger {
            threshold,
            inner: Mutex::new(Inner {
                path,
                file: Some(file),
            }),
        })
    }

    fn check_log(inner: &mut Inner) {
        let missing = !inner.path.exists();
        if missing || inner.file.is_none() {
            inner.file = open_append(&inner.path).ok();
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl EngineLog for FileLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if level > self.threshold {
            return;
        }
        let line = format!("{} UTC: {}\n", Timestamp::now().format(), message);
        let mut inner = self.inner.lock().expect("log mutex poisoned");
        Self::check_log(&mut inner);
        if let Some(file) = inner.file.as_mut() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
    }
}

/// Sink used by tests and by components that have not yet been wired to a
/// real file (avoids `Option<Arc<dyn EngineLog>>` plumbing everywhere).
pub struct NullLogger;

impl EngineLog for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Bridges `tracing` events emitted anywhere in the engine into an
/// [`EngineLog`], the way the teacher's `plugin/host/native.rs` bridges a
/// native plugin's log callback into `log::log!`. Attach with
/// `tracing_subscriber::registry().with(EngineLogLayer::new(log))`.
pub struct EngineLogLayer {
    sink: std::sync::Arc<dyn EngineLog>,
}

impl EngineLogLayer {
    pub fn new(sink: std::sync::Arc<dyn EngineLog>) -> Self {
        EngineLogLayer { sink }
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S> Layer<S> for EngineLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => LogLevel::Err,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        };
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.sink.log(level, &visitor.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_threshold_filtered_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-m1.log");
        let logger = FileLogger::open(&path, LogLevel::Warn).unwrap();
        logger.err("boom");
        logger.warn("careful");
        logger.info("ignored");
        logger.debug("ignored too");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("UTC: boom"));
        assert!(contents.contains("UTC: careful"));
        assert!(!contents.contains("ignored"));
    }

    #[test]
    fn reopens_after_external_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-m1.log");
        let logger = FileLogger::open(&path, LogLevel::Debug).unwrap();
        logger.info("before rotation");

        std::fs::remove_file(&path).unwrap();
        logger.info("after rotation");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("after rotation"));
    }
}
