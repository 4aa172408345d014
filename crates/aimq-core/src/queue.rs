//! [`Queue`] — one [`crate::runnable::Runnable`] bound to one queue name,
//! owning retry/DLQ policy and finalization strategy (spec §4.3).
//!
//! Grounded in `examples/original_source/src/aimq/queue.py`'s `work()` /
//! `send_to_dlq()` / `finish()` methods, carried over field-for-field.

use crate::job::Job;
use crate::provider::QueueProvider;
use crate::retry::RetryCounter;
use crate::runnable::{InvocationMetadata, JobInvocationConfig, Runnable};
use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked (best-effort) on a failed dispatch, before the
/// retry/DLQ decision is made. A panic-free closure is assumed; any error it
/// returns is logged and swallowed, never propagated.
pub type OnError = Arc<dyn Fn(&Job, &anyhow::Error) + Send + Sync>;

#[derive(Clone)]
pub struct QueueConfig {
    pub timeout: i64,
    pub delete_on_finish: bool,
    pub tags: Vec<String>,
    pub max_retries: Option<i32>,
    pub dlq: Option<String>,
    pub on_error: Option<OnError>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            timeout: 300,
            delete_on_finish: false,
            tags: Vec::new(),
            max_retries: None,
            dlq: None,
            on_error: None,
        }
    }
}

/// Outcome of one `work()` call, reported to the [`crate::worker::WorkerLoop`]
/// so it can update presence and reset backoff.
#[derive(Debug, Clone)]
pub struct WorkOutcome {
    pub job_id: i64,
    pub result: Value,
}

pub struct Queue {
    name: String,
    provider: Arc<dyn QueueProvider>,
    runnable: Arc<dyn Runnable>,
    config: QueueConfig,
    retry: RetryCounter,
    worker_name: String,
}

impl Queue {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn QueueProvider>,
        runnable: Arc<dyn Runnable>,
        config: QueueConfig,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            runnable,
            config,
            retry: RetryCounter::new(),
            worker_name: "peon".to_string(),
        }
    }

    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retry_counter(&self) -> &RetryCounter {
        &self.retry
    }

    /// §4.3.1. `timeout == 0` switches fetch strategy to `pop`.
    async fn next(&self) -> Option<Job> {
        let result = if self.config.timeout == 0 {
            self.provider.pop(&self.name).await
        } else {
            self.provider
                .read(&self.name, self.config.timeout, 1)
                .await
                .map(|mut jobs| jobs.pop())
        };

        match result {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(queue = %self.name, error = %e, "next() failed, treating as no-work");
                None
            }
        }
    }

    /// §4.3.2. Extracts/synthesizes `thread_id`, strips it from the payload,
    /// then dispatches to the runnable.
    async fn run(&self, job: &Job) -> Result<Value> {
        let thread_id = job.thread_id().unwrap_or_else(|| format!("job-{}", job.id));
        let mut configurable = HashMap::new();
        configurable.insert("thread_id".to_string(), thread_id);

        let config = JobInvocationConfig {
            metadata: InvocationMetadata {
                worker: self.worker_name.clone(),
                queue: self.name.clone(),
                job: job.id,
            },
            tags: self.config.tags.clone(),
            configurable,
        };

        self.runnable.invoke(job.data_without_thread_id(), config).await
    }

    /// §4.3.3. The core dispatch procedure. `Ok(None)` means no job was
    /// available; `Ok(Some)` is a completed (successful or terminally
    /// failed-and-finalized) dispatch; `Err` is a retryable failure the
    /// caller must not finalize against.
    pub async fn work(&self, default_max_retries: i32) -> Result<Option<WorkOutcome>> {
        let job = match self.next().await {
            Some(job) => job,
            None => return Ok(None),
        };

        let max_retries = self.config.max_retries.unwrap_or(default_max_retries);
        tracing::debug!(queue = %self.name, job_id = job.id, attempt = job.attempt, max_retries, "dispatching job");

        match self.run(&job).await {
            Ok(result) => {
                self.finish(&job).await;
                self.retry.record_success();
                Ok(Some(WorkOutcome { job_id: job.id, result }))
            }
            Err(e) => {
                self.retry.record_failure();
                tracing::error!(queue = %self.name, job_id = job.id, error = %e, "invoke failed");
                if let Some(on_error) = &self.config.on_error {
                    on_error(&job, &e);
                }

                if job.attempt >= max_retries {
                    match &self.config.dlq {
                        Some(dlq) => match self.send_to_dlq(&job, &e, dlq).await {
                            Ok(_) => {
                                self.finish(&job).await;
                                Ok(None)
                            }
                            Err(dlq_err) => {
                                tracing::error!(queue = %self.name, job_id = job.id, error = %dlq_err, "send_to_dlq failed");
                                Err(e)
                            }
                        },
                        None => {
                            tracing::warn!(queue = %self.name, job_id = job.id, "max retries exhausted, no DLQ; finalizing to stop redelivery");
                            self.finish(&job).await;
                            Ok(None)
                        }
                    }
                } else {
                    Err(e)
                }
            }
        }
    }

    /// §4.3.4. `dlq` not being configured is a caller error: this path is
    /// only reached from `work()`, which already checked `self.config.dlq`.
    async fn send_to_dlq(&self, job: &Job, error: &anyhow::Error, dlq: &str) -> Result<i64> {
        let envelope = json!({
            "original_queue": self.name,
            "original_job_id": job.id,
            "attempt_count": job.attempt,
            "error_type": "invoke_error",
            "error_message": error.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "job_data": job.data,
        });
        self.provider.send(dlq, envelope, None).await
    }

    /// §4.3.5. Popped jobs are already gone from the provider; everything
    /// else is deleted or archived per `delete_on_finish`. Errors are logged
    /// and swallowed — the core never retries finalization.
    async fn finish(&self, job: &Job) -> bool {
        if job.popped {
            return true;
        }

        let result = if self.config.delete_on_finish {
            self.provider.delete(&self.name, job.id).await
        } else {
            self.provider.archive(&self.name, job.id).await
        };

        match result {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(queue = %self.name, job_id = job.id, error = %e, "finish() failed");
                false
            }
        }
    }
}
