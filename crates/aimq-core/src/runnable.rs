//! The [`Runnable`] contract — the only coupling between the core and user
//! task bodies.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Metadata the core attaches to every invocation.
#[derive(Debug, Clone)]
pub struct InvocationMetadata {
    pub worker: String,
    pub queue: String,
    pub job: i64,
}

/// The value passed to [`Runnable::invoke`]. `configurable.thread_id` is
/// always present: the caller-supplied value if `job.data` had one,
/// otherwise `"job-<id>"` synthesized by the [`crate::queue::Queue`].
#[derive(Debug, Clone)]
pub struct JobInvocationConfig {
    pub metadata: InvocationMetadata,
    pub tags: Vec<String>,
    pub configurable: HashMap<String, String>,
}

impl JobInvocationConfig {
    pub fn thread_id(&self) -> &str {
        self.configurable
            .get("thread_id")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Anything satisfying `invoke` (required by the dispatch path) and `stream`
/// (required by the contract, never called from the dispatch path itself).
/// The core never inspects the output.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// A stable name for this runnable, used to derive the queue name when
    /// none is given to `Worker::assign`.
    fn name(&self) -> Option<&str> {
        None
    }

    async fn invoke(&self, input: Value, config: JobInvocationConfig) -> anyhow::Result<Value>;

    /// Streaming variant. Not called by the dispatch loop; provided so the
    /// capability set matches the spec's Runnable contract exactly.
    async fn stream(
        &self,
        input: Value,
        config: JobInvocationConfig,
    ) -> anyhow::Result<Vec<Value>> {
        Ok(vec![self.invoke(input, config).await?])
    }
}

/// Wraps a plain async function as a [`Runnable`], mirroring the Python
/// `Worker.task` decorator (`invoke = func`, `stream` = one-shot iterable).
pub struct FnRunnable<F> {
    name: Option<String>,
    func: F,
}

impl<F> FnRunnable<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self { name: Some(name.into()), func }
    }
}

#[async_trait]
impl<F, Fut> Runnable for FnRunnable<F>
where
    F: Fn(Value, JobInvocationConfig) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn invoke(&self, input: Value, config: JobInvocationConfig) -> anyhow::Result<Value> {
        (self.func)(input, config).await
    }
}
