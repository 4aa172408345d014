//! Error taxonomy for the core crate.
//!
//! Mirrors the split the teacher framework uses: `thiserror`-derived variants
//! where a caller needs to match (queue-not-found, configuration errors), and
//! `anyhow::Result` everywhere the error is just propagated and logged.

use thiserror::Error;

/// Errors the core surfaces to its own callers (Worker, WorkerLoop, Queue).
#[derive(Debug, Error)]
pub enum AimqError {
    /// The named queue does not exist at the provider.
    #[error("queue '{0}' not found")]
    QueueNotFound(String),

    /// A `Worker::assign` call could not determine a queue name.
    #[error("queue name is required: the runnable has no name and none was supplied")]
    MissingQueueName,

    /// `send_to_dlq` was called on a queue with no DLQ configured.
    #[error("no DLQ configured for queue '{0}'")]
    NoDlqConfigured(String),

    /// `Worker::load` could not find a `worker` symbol in the loaded module.
    #[error("module at {0} does not export a `worker` value")]
    MissingWorkerSymbol(String),

    /// Any other provider-side error, passed through unchanged.
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}
