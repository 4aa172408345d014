//! [`QueueProvider`] — the interface the core is implemented against.
//!
//! Policy (retries, backoff, dead-lettering) lives in [`crate::queue::Queue`]
//! and [`crate::worker::WorkerLoop`]; the provider only exposes the raw queue
//! operations and their lease semantics. This mirrors the split the teacher
//! framework's job module documents: "seesaw owns interfaces only. Policy
//! decisions... belong in the application's job worker implementation."

use crate::job::Job;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Administrative metadata about one queue, returned by `list_queues`.
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub queue_name: String,
    pub realtime_enabled: bool,
    pub queue_length: i64,
    pub total_messages: i64,
}

/// Abstracts the remote queue operations a [`crate::queue::Queue`] dispatches
/// against. Implementers are responsible for lease semantics: `read` must
/// hide a message for `vt_seconds` and increment its read count on
/// redelivery; `pop` must atomically read-and-delete with no lease.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Enqueue one message; returns its id. `delay` is an optional
    /// visibility delay in seconds before the message becomes readable.
    async fn send(&self, queue: &str, data: Value, delay: Option<i64>) -> Result<i64>;

    /// Enqueue many messages; ids are returned in input order.
    async fn send_batch(&self, queue: &str, data: Vec<Value>, delay: Option<i64>) -> Result<Vec<i64>>;

    /// Non-blocking read of up to `n` jobs, invisible for `vt_seconds`.
    async fn read(&self, queue: &str, vt_seconds: i64, n: i64) -> Result<Vec<Job>>;

    /// Atomically read-and-delete one job. No visibility lease, no retry.
    async fn pop(&self, queue: &str) -> Result<Option<Job>>;

    /// Move a message to the archive (kept for audit).
    async fn archive(&self, queue: &str, id: i64) -> Result<bool>;

    /// Permanently remove a message.
    async fn delete(&self, queue: &str, id: i64) -> Result<bool>;

    /// Create a new queue, optionally wiring a realtime trigger.
    async fn create_queue(&self, queue: &str, with_realtime: bool) -> Result<()>;

    /// List all queues known to the provider.
    async fn list_queues(&self) -> Result<Vec<QueueInfo>>;

    /// Enable the realtime trigger on an existing queue.
    async fn enable_queue_realtime(&self, queue: &str) -> Result<()>;

    /// Disable the realtime trigger on an existing queue.
    async fn disable_queue_realtime(&self, queue: &str) -> Result<()>;
}
