//! [`WorkerLoop`] (the round-robin scheduling engine) and [`Worker`] (the
//! top-level coordinator) — spec §4.4, §4.6.
//!
//! Grounded in `examples/original_source/src/aimq/worker.py`'s
//! `WorkerThread` main loop (backoff calc, 100 ms interruptible-sleep
//! polling, two-phase shutdown) and `Worker.assign`/`start`/`stop`. Signal
//! handling is adapted to `tokio::signal` rather than the Python
//! `signal.signal` + termios ^C-echo-suppression dance, which has no
//! counterpart once there is no controlling terminal UI to preserve.

use crate::config::Config;
use crate::logger::Logger;
use crate::provider::QueueProvider;
use crate::queue::{Queue, QueueConfig, WorkOutcome};
use crate::realtime::{RealtimeTransport, RealtimeWakeupService};
use crate::registry::WorkerRegistry;
use crate::runnable::Runnable;
use crate::wake::WakeEvent;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const IDLE_SLEEP_TICK: Duration = Duration::from_millis(100);

/// The scheduling engine: round-robins `queues` once per pass, applying
/// per-queue exponential backoff on consecutive failure and an
/// interruptible idle sleep when a pass finds no work.
pub struct WorkerLoop {
    registry: Arc<WorkerRegistry>,
    logger: Logger,
    running: Arc<AtomicBool>,
    idle_wait: f64,
    backoff_multiplier: f64,
    max_backoff: f64,
    default_max_retries: i32,
    realtime_service: Option<RealtimeWakeupService>,
    wake_event: WakeEvent,
}

impl WorkerLoop {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        logger: Logger,
        running: Arc<AtomicBool>,
        config: &Config,
        realtime_service: Option<RealtimeWakeupService>,
        wake_event: WakeEvent,
    ) -> Self {
        Self {
            registry,
            logger,
            running,
            idle_wait: config.worker_idle_wait,
            backoff_multiplier: config.queue_backoff_multiplier,
            max_backoff: config.queue_max_backoff,
            default_max_retries: config.queue_max_retries,
            realtime_service,
            wake_event,
        }
    }

    /// Runs until `running` clears. Never returns an error: every per-queue
    /// dispatch failure is caught, logged, and folded into backoff.
    pub async fn run(self) {
        let mut current_backoff = self.idle_wait;

        while self.running.load(Ordering::SeqCst) {
            let mut found_jobs = false;
            let mut any_reset = false;

            for (name, queue) in self.registry.iter() {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                match queue.work(self.default_max_retries).await {
                    Ok(Some(WorkOutcome { job_id, .. })) => {
                        found_jobs = true;
                        any_reset = true;
                        self.logger.info(
                            format!("queue '{name}' dispatched job {job_id}"),
                            None,
                        );
                        if let Some(service) = &self.realtime_service {
                            let mut current_jobs = HashMap::new();
                            current_jobs.insert(name.to_string(), job_id);
                            service.update_presence("busy", current_jobs);
                        }
                    }
                    Ok(None) => {
                        // No job available this pass; not a failure.
                    }
                    Err(e) => {
                        self.logger.error(
                            format!("queue '{name}' dispatch failed: {e}"),
                            None,
                        );
                        if queue.retry_counter().failures() > 1 {
                            current_backoff = queue.retry_counter().backoff_seconds(
                                self.idle_wait,
                                self.backoff_multiplier,
                                self.max_backoff,
                            );
                        }
                    }
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if any_reset {
                current_backoff = self.idle_wait;
            }

            if !found_jobs {
                if let Some(service) = &self.realtime_service {
                    service.update_presence("idle", HashMap::new());
                }
                self.interruptible_sleep(&mut current_backoff).await;
            }
        }

        if let Some(service) = &self.realtime_service {
            service.unregister_worker_async(&self.wake_event).await;
        }
    }

    async fn interruptible_sleep(&self, current_backoff: &mut f64) {
        self.wake_event.clear();
        let deadline = Instant::now() + Duration::from_secs_f64(*current_backoff);

        while Instant::now() < deadline {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            if self.wake_event.is_set() {
                self.wake_event.clear();
                *current_backoff = self.idle_wait;
                return;
            }
            tokio::time::sleep(IDLE_SLEEP_TICK).await;
        }
    }
}

/// Builder state for one `assign(...)` call, mirroring the Python
/// `Worker.assign` keyword arguments.
pub struct AssignOptions {
    pub queue: Option<String>,
    pub timeout: i64,
    pub delete_on_finish: bool,
    pub tags: Vec<String>,
    pub max_retries: Option<i32>,
    pub dlq: Option<String>,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            queue: None,
            timeout: 300,
            delete_on_finish: false,
            tags: Vec::new(),
            max_retries: None,
            dlq: None,
        }
    }
}

/// Called with the registered queue names when `start`'s `show_info` resolves
/// true. This crate renders no output itself (no terminal UI in scope) —
/// a caller wanting a startup banner supplies its own rendering here via
/// [`Worker::with_startup_hook`].
pub type StartupHook = Arc<dyn Fn(&[String]) + Send + Sync>;

/// How long the first shutdown signal waits for the in-flight `WorkerLoop`
/// to finish before warning and giving up on a clean join. Mirrors
/// `worker.py::stop`'s `thread.join(timeout=10.0)` ("accounts for a 5 second
/// queue read timeout").
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level coordinator: owns the registry, starts the loop and the
/// realtime service, and drives the two-phase shutdown state machine.
pub struct Worker {
    provider: Arc<dyn QueueProvider>,
    config: Config,
    registry: WorkerRegistry,
    logger: Logger,
    running: Arc<AtomicBool>,
    loop_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    realtime_transport: Option<Arc<dyn RealtimeTransport>>,
    realtime_service: Option<RealtimeWakeupService>,
    shutdown_count: Arc<std::sync::atomic::AtomicU32>,
    startup_hook: Option<StartupHook>,
}

impl Worker {
    pub fn new(provider: Arc<dyn QueueProvider>, config: Config) -> Self {
        Self {
            provider,
            config,
            registry: WorkerRegistry::new(),
            logger: Logger::new(),
            running: Arc::new(AtomicBool::new(false)),
            loop_handle: Arc::new(tokio::sync::Mutex::new(None)),
            realtime_transport: None,
            realtime_service: None,
            shutdown_count: Arc::new(std::sync::atomic::AtomicU32::new(0)),
            startup_hook: None,
        }
    }

    /// Supplies the realtime transport (e.g. a websocket client against
    /// Supabase Realtime). Only consulted if `config.realtime_enabled()`;
    /// without one, the worker runs purely on `idle_wait` polling.
    pub fn with_realtime_transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.realtime_transport = Some(transport);
        self
    }

    /// Supplies a startup banner/info renderer, invoked from `start` with the
    /// registered queue names when `show_info` resolves true.
    pub fn with_startup_hook(mut self, hook: StartupHook) -> Self {
        self.startup_hook = Some(hook);
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Binds `runnable` to a queue name and inserts it into the registry.
    /// The queue name is `opts.queue`, falling back to `runnable.name()`;
    /// if neither is present this is a configuration error (spec §7).
    pub fn assign(
        &mut self,
        runnable: Arc<dyn Runnable>,
        opts: AssignOptions,
    ) -> Result<()> {
        let name = opts
            .queue
            .clone()
            .or_else(|| runnable.name().map(str::to_string))
            .ok_or(crate::error::AimqError::MissingQueueName)?;

        let queue_config = QueueConfig {
            timeout: opts.timeout,
            delete_on_finish: opts.delete_on_finish,
            tags: opts.tags,
            max_retries: opts.max_retries,
            dlq: opts.dlq,
            on_error: None,
        };

        let queue = Queue::new(name.clone(), self.provider.clone(), runnable, queue_config)
            .with_worker_name(self.config.worker_name.clone());
        self.registry.insert(name, queue);
        Ok(())
    }

    /// Forward a send to the named queue's underlying provider. Returns the
    /// provider-assigned message id.
    pub async fn send(&self, queue: &str, data: serde_json::Value, delay: Option<i64>) -> Result<i64> {
        self.provider.send(queue, data, delay).await
    }

    /// Run exactly one dispatch against the named queue, bypassing the loop.
    pub async fn work(&self, queue: &str) -> Result<Option<WorkOutcome>> {
        let q = self
            .registry
            .get(queue)
            .ok_or_else(|| crate::error::AimqError::QueueNotFound(queue.to_string()))?;
        q.work(self.config.queue_max_retries).await
    }

    /// Starts the realtime service (if configured) and the WorkerLoop, then
    /// (if `block`) drains the logger on the calling task until it is
    /// stopped. Installs termination signal handling for the two-phase
    /// shutdown protocol.
    ///
    /// `show_info`, when `None`, falls back to the `AIMQ_SHOW_INFO`
    /// environment variable (`"true"`, case-insensitive; anything else is
    /// `false`). When it resolves true and a [`StartupHook`] was supplied via
    /// [`Worker::with_startup_hook`], the hook is called with the registered
    /// queue names before the loop starts.
    pub async fn start(&mut self, block: bool, show_info: Option<bool>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let show_info = show_info.unwrap_or_else(|| {
            std::env::var("AIMQ_SHOW_INFO")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        });
        if show_info {
            if let Some(hook) = &self.startup_hook {
                hook(self.registry.names());
            }
        }

        let wake_event = WakeEvent::new();
        let realtime_service = match (self.config.realtime_enabled(), &self.realtime_transport) {
            (true, Some(transport)) => {
                let service = RealtimeWakeupService::start(
                    transport.clone(),
                    self.config.worker_name.clone(),
                    self.registry.names().to_vec(),
                );
                service.register_worker_async(wake_event.clone()).await;
                Some(service)
            }
            (true, None) => {
                self.logger.warning(
                    "realtime configured but no transport supplied; falling back to polling",
                    None,
                );
                None
            }
            (false, _) => None,
        };
        self.realtime_service = realtime_service.clone();

        let registry = Arc::new(std::mem::take(&mut self.registry));
        let worker_loop = WorkerLoop::new(
            registry,
            self.logger.clone(),
            self.running.clone(),
            &self.config,
            realtime_service,
            wake_event,
        );

        *self.loop_handle.lock().await = Some(tokio::spawn(worker_loop.run()));
        self.install_signal_handlers();

        if block {
            let logger = self.logger.clone();
            logger.drain(crate::logger::LogLevel::Info, |_event| {}).await;
        }

        Ok(())
    }

    fn install_signal_handlers(&self) {
        let running = self.running.clone();
        let logger = self.logger.clone();
        let shutdown_count = self.shutdown_count.clone();
        let realtime_service = self.realtime_service.clone();
        let loop_handle = self.loop_handle.clone();

        tokio::spawn(async move {
            let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };

            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }

                let count = shutdown_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count == 1 {
                    logger.info("Shutting down...", None);
                    running.store(false, Ordering::SeqCst);
                    if let Some(service) = &realtime_service {
                        service.stop();
                    }
                    logger.stop();

                    // Joining runs on its own task rather than inline here so a
                    // second signal (force exit) is still observed immediately
                    // by the `select!` above instead of waiting out the join.
                    let logger = logger.clone();
                    let loop_handle = loop_handle.clone();
                    tokio::spawn(async move {
                        let handle = loop_handle.lock().await.take();
                        match handle {
                            Some(handle) => match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, handle).await {
                                Ok(_) => logger.info("Worker stopped", None),
                                Err(_) => logger.warning(
                                    "Worker loop did not stop within 10 seconds. Press Ctrl+C again to force quit.",
                                    None,
                                ),
                            },
                            None => logger.info("Worker stopped", None),
                        }
                    });
                } else {
                    logger.critical("Force exit", None);
                    std::process::exit(1);
                }
            }
        });
    }

    /// Join the background loop with a bounded timeout, the same join the
    /// first shutdown signal performs. Exposed separately so a caller that
    /// doesn't drain the logger on the main thread can still wait for clean
    /// exit. A no-op (returns `true` immediately) if the loop was already
    /// joined, e.g. by the signal handler.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            tokio::time::timeout(timeout, handle).await.is_ok()
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::QueueInfo;
    use crate::runnable::FnRunnable;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CountingProvider {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl QueueProvider for CountingProvider {
        async fn send(&self, _: &str, _: Value, _: Option<i64>) -> Result<i64> {
            Ok(1)
        }
        async fn send_batch(&self, _: &str, _: Vec<Value>, _: Option<i64>) -> Result<Vec<i64>> {
            Ok(vec![])
        }
        async fn read(&self, _: &str, _: i64, _: i64) -> Result<Vec<crate::job::Job>> {
            *self.calls.lock().await += 1;
            Ok(vec![])
        }
        async fn pop(&self, _: &str) -> Result<Option<crate::job::Job>> {
            Ok(None)
        }
        async fn archive(&self, _: &str, _: i64) -> Result<bool> {
            Ok(true)
        }
        async fn delete(&self, _: &str, _: i64) -> Result<bool> {
            Ok(true)
        }
        async fn create_queue(&self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
            Ok(vec![])
        }
        async fn enable_queue_realtime(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn disable_queue_realtime(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn assign_requires_a_name() {
        let provider = Arc::new(CountingProvider::default());
        let mut worker = Worker::new(provider, Config::default());
        let runnable: Arc<dyn Runnable> =
            Arc::new(FnRunnable::new("unnamed", |input, _cfg| async move { Ok(input) }));

        // Explicitly clear the name to simulate an anonymous runnable.
        struct Anonymous;
        #[async_trait]
        impl Runnable for Anonymous {
            async fn invoke(&self, input: Value, _config: crate::runnable::JobInvocationConfig) -> Result<Value> {
                Ok(input)
            }
        }
        let anon: Arc<dyn Runnable> = Arc::new(Anonymous);
        let result = worker.assign(anon, AssignOptions::default());
        assert!(result.is_err());

        // A named runnable succeeds.
        worker.assign(runnable, AssignOptions::default()).unwrap();
        assert_eq!(worker.registry.len(), 1);
    }

    #[tokio::test]
    async fn show_info_true_invokes_startup_hook_with_queue_names() {
        let provider = Arc::new(CountingProvider::default());
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_writer = seen.clone();
        let mut worker = Worker::new(provider, Config::default())
            .with_startup_hook(Arc::new(move |names: &[String]| {
                let seen = seen_writer.clone();
                let names = names.to_vec();
                tokio::spawn(async move {
                    *seen.lock().await = names;
                });
            }));
        let runnable: Arc<dyn Runnable> =
            Arc::new(FnRunnable::new("echo", |input, _cfg| async move { Ok(input) }));
        worker.assign(runnable, AssignOptions::default()).unwrap();

        worker.start(false, Some(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().await, vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn idle_loop_polls_each_queue_once_per_pass() {
        let provider = Arc::new(CountingProvider::default());
        let mut worker = Worker::new(provider.clone(), Config { worker_idle_wait: 0.05, ..Default::default() });
        let runnable: Arc<dyn Runnable> =
            Arc::new(FnRunnable::new("echo", |input, _cfg| async move { Ok(input) }));
        worker.assign(runnable, AssignOptions { timeout: 1, ..Default::default() }).unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let registry = Arc::new(std::mem::take(&mut worker.registry));
        let wake_event = WakeEvent::new();
        let worker_loop = WorkerLoop::new(registry, worker.logger.clone(), running.clone(), &worker.config, None, wake_event);

        let handle = tokio::spawn(worker_loop.run());
        tokio::time::sleep(Duration::from_millis(120)).await;
        running.store(false, Ordering::SeqCst);
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert!(*provider.calls.lock().await >= 1);
    }
}
