//! [`RealtimeWakeupService`] — subscribes to a broadcast channel, filters by
//! monitored queue name, and wakes registered [`WakeEvent`]s (spec §4.5).
//!
//! Grounded in `examples/original_source/src/aimq/realtime.py`'s
//! `RealtimeWakeupService`: the Phoenix-channel broadcast/presence protocol
//! it drives against Supabase Realtime is abstracted behind
//! [`RealtimeTransport`] so the production implementation (websocket, in
//! `aimq-postgres`) and a deterministic in-memory fake (in `aimq-testing`)
//! share the same service logic.

use crate::wake::WakeEvent;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

/// One broadcast payload, per spec §6.4: `{queue, job_id}`.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub queue: String,
    pub job_id: i64,
}

/// Abstracts the Phoenix-channel-over-websocket transport the Python client
/// drives. `connect` establishes the channel and returns a stream of
/// broadcasts; a transport error on that stream (the channel closing) is
/// what triggers the service's reconnect-with-backoff loop.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<BroadcastMessage>>;
    async fn publish_presence(&self, payload: Value) -> Result<()>;
    async fn close(&self);
}

#[derive(Debug, Clone)]
struct PresenceUpdate {
    status: String,
    current_jobs: HashMap<String, i64>,
}

struct Shared {
    wake_registry: Mutex<Vec<WakeEvent>>,
    monitored: HashSet<String>,
    worker_name: String,
}

/// Handle to a running service. Cloning is cheap; `stop()` from any clone
/// stops the background task.
#[derive(Clone)]
pub struct RealtimeWakeupService {
    shared: Arc<Shared>,
    presence_tx: mpsc::UnboundedSender<PresenceUpdate>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl RealtimeWakeupService {
    /// Spawns the background reconnect/receive loop. `monitored_queues` is
    /// the set of queue names this worker cares about broadcasts for.
    pub fn start(
        transport: Arc<dyn RealtimeTransport>,
        worker_name: impl Into<String>,
        monitored_queues: impl IntoIterator<Item = String>,
    ) -> Self {
        let shared = Arc::new(Shared {
            wake_registry: Mutex::new(Vec::new()),
            monitored: monitored_queues.into_iter().collect(),
            worker_name: worker_name.into(),
        });
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        tokio::spawn(Self::run(
            transport,
            shared.clone(),
            presence_rx,
            running.clone(),
        ));

        Self { shared, presence_tx, running }
    }

    /// Fire-and-forget registration: spawns a task to take the lock, so
    /// callers outside an async context can still register a worker.
    pub fn register_worker(&self, event: WakeEvent) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.wake_registry.lock().await.push(event);
        });
    }

    /// Preferred over `register_worker` when already in an async context.
    pub async fn register_worker_async(&self, event: WakeEvent) {
        self.shared.wake_registry.lock().await.push(event);
    }

    pub async fn unregister_worker_async(&self, event: &WakeEvent) {
        let mut registry = self.shared.wake_registry.lock().await;
        registry.retain(|w| !w.ptr_eq(event));
    }

    /// Schedule a presence publish on the IO loop. Non-blocking: if the
    /// service has stopped, the update is silently dropped.
    pub fn update_presence(&self, status: impl Into<String>, current_jobs: HashMap<String, i64>) {
        let _ = self.presence_tx.send(PresenceUpdate { status: status.into(), current_jobs });
    }

    pub fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn presence_payload(shared: &Shared, update: &PresenceUpdate) -> Value {
        json!({
            "worker": shared.worker_name,
            "queues": shared.monitored.iter().cloned().collect::<Vec<_>>(),
            "status": update.status,
            "current_jobs": update.current_jobs,
            "job_count": update.current_jobs.len(),
        })
    }

    async fn run(
        transport: Arc<dyn RealtimeTransport>,
        shared: Arc<Shared>,
        mut presence_rx: mpsc::UnboundedReceiver<PresenceUpdate>,
        running: Arc<std::sync::atomic::AtomicBool>,
    ) {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        while running.load(std::sync::atomic::Ordering::SeqCst) {
            let mut rx = match transport.connect().await {
                Ok(rx) => {
                    backoff = Duration::from_secs(1);
                    let idle = PresenceUpdate { status: "idle".to_string(), current_jobs: HashMap::new() };
                    let _ = transport.publish_presence(Self::presence_payload(&shared, &idle)).await;
                    rx
                }
                Err(e) => {
                    tracing::warn!(error = %e, backoff_secs = backoff.as_secs(), "realtime connect failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            loop {
                if !running.load(std::sync::atomic::Ordering::SeqCst) {
                    transport.close().await;
                    return;
                }

                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(broadcast) => Self::handle_broadcast(&shared, broadcast).await,
                            None => break,
                        }
                    }
                    update = presence_rx.recv() => {
                        if let Some(update) = update {
                            let _ = transport.publish_presence(Self::presence_payload(&shared, &update)).await;
                        }
                    }
                }
            }

            tracing::warn!(backoff_secs = backoff.as_secs(), "realtime channel closed, reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        transport.close().await;
    }

    async fn handle_broadcast(shared: &Shared, msg: BroadcastMessage) {
        if !shared.monitored.contains(&msg.queue) {
            return;
        }
        let registry = shared.wake_registry.lock().await;
        for event in registry.iter() {
            event.set();
        }
    }
}
