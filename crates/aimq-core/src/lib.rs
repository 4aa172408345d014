//! # aimq-core
//!
//! A reliable task-execution substrate over a Postgres-backed message queue:
//! retries, dead-lettering, visibility-timeout leases, realtime wake-up, and
//! graceful two-phase shutdown.
//!
//! ## Core concepts
//!
//! - [`job::Job`] — the immutable record a provider returns for one read/pop.
//! - [`provider::QueueProvider`] — the interface the core is implemented
//!   against; a concrete provider (e.g. `aimq-postgres`) supplies the
//!   transport to a real queue.
//! - [`runnable::Runnable`] — the only coupling to user task bodies.
//! - [`queue::Queue`] — one runnable bound to one queue name, owning
//!   retry/DLQ policy and finalization.
//! - [`worker::WorkerLoop`] — round-robins queues, applies backoff, sleeps
//!   interruptibly between passes.
//! - [`realtime::RealtimeWakeupService`] — subscribes to a broadcast
//!   channel and wakes the loop early when a monitored queue gets a job.
//! - [`worker::Worker`] — the top-level coordinator: registry, loop,
//!   realtime service, and the two-phase shutdown protocol.
//!
//! ## Architecture
//!
//! ```text
//! Worker::start()
//!     │
//!     ├─► RealtimeWakeupService::start()  (optional; needs a transport)
//!     │        │
//!     │        └─► wakes WakeEvent on broadcast for a monitored queue
//!     │
//!     ├─► WorkerLoop::run()  (spawned task)
//!     │        │
//!     │        for (name, queue) in registry:
//!     │            queue.work()  ─► provider.read/pop ─► runnable.invoke ─► finish/send_to_dlq
//!     │        │
//!     │        no work this pass ─► interruptible sleep (wake_event | running | tick)
//!     │
//!     └─► Logger::drain()  (blocks the calling task until stop() is called)
//! ```
//!
//! Two termination signals drive shutdown: the first clears `running`, stops
//! the realtime service, and publishes the logger's stop sentinel; the
//! second force-exits immediately.

pub mod config;
pub mod error;
pub mod job;
pub mod logger;
pub mod provider;
pub mod queue;
pub mod realtime;
pub mod registry;
pub mod retry;
pub mod runnable;
pub mod wake;
pub mod worker;

pub use config::Config;
pub use error::AimqError;
pub use job::Job;
pub use logger::{LogEvent, LogLevel, Logger};
pub use provider::{QueueInfo, QueueProvider};
pub use queue::{Queue, QueueConfig, WorkOutcome};
pub use realtime::{BroadcastMessage, RealtimeTransport, RealtimeWakeupService};
pub use registry::WorkerRegistry;
pub use retry::RetryCounter;
pub use runnable::{FnRunnable, InvocationMetadata, JobInvocationConfig, Runnable};
pub use wake::WakeEvent;
pub use worker::{AssignOptions, StartupHook, Worker, WorkerLoop};
