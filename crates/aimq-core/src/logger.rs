//! Non-blocking log sink with a blocking drain consumer.
//!
//! Mirrors `examples/original_source/src/aimq/logger.py`: producers never
//! block, and `stop()` publishes a sentinel that unblocks the draining
//! consumer. Every event is additionally emitted through `tracing`, so
//! operational log pipelines see the same events the drained feed does.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub msg: String,
    pub data: Option<Value>,
}

impl LogEvent {
    fn emit_tracing(&self) {
        match self.level {
            LogLevel::Debug => tracing::debug!(data = ?self.data, "{}", self.msg),
            LogLevel::Info => tracing::info!(data = ?self.data, "{}", self.msg),
            LogLevel::Warning => tracing::warn!(data = ?self.data, "{}", self.msg),
            LogLevel::Error => tracing::error!(data = ?self.data, "{}", self.msg),
            LogLevel::Critical => tracing::error!(data = ?self.data, critical = true, "{}", self.msg),
        }
    }
}

/// A producer-consumer log sink. Cloning shares the same underlying channel
/// (cheap `Arc` clone), so every Queue/Worker/RealtimeWakeupService can hold
/// its own handle.
#[derive(Clone)]
pub struct Logger {
    tx: mpsc::UnboundedSender<Option<LogEvent>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<LogEvent>>>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Arc::new(tokio::sync::Mutex::new(rx)) }
    }

    fn log(&self, level: LogLevel, msg: impl Into<String>, data: Option<Value>) {
        let event = LogEvent { level, msg: msg.into(), data };
        event.emit_tracing();
        // An unbounded sender only fails once every receiver has dropped,
        // which only happens after the logger itself is gone; there is
        // nothing a producer can usefully do about that, so it's ignored.
        let _ = self.tx.send(Some(event));
    }

    pub fn debug(&self, msg: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Debug, msg, data);
    }
    pub fn info(&self, msg: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Info, msg, data);
    }
    pub fn warning(&self, msg: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Warning, msg, data);
    }
    pub fn error(&self, msg: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Error, msg, data);
    }
    pub fn critical(&self, msg: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Critical, msg, data);
    }

    /// Publish the sentinel that unblocks the draining consumer. Idempotent:
    /// the channel simply carries another `None`.
    pub fn stop(&self) {
        let _ = self.tx.send(None);
    }

    /// Drain events until the sentinel appears, invoking `on_event` for each
    /// one at or above `min_level`. This is the main thread's blocking
    /// consumer loop; it is async so it can be `.await`ed alongside the
    /// worker loop and realtime service under the same runtime.
    pub async fn drain(&self, min_level: LogLevel, mut on_event: impl FnMut(&LogEvent)) {
        let mut rx = self.rx.lock().await;
        while let Some(slot) = rx.recv().await {
            match slot {
                None => break,
                Some(event) => {
                    if event.level >= min_level {
                        on_event(&event);
                    }
                }
            }
        }
    }
}
