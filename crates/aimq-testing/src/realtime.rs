//! [`MockRealtimeTransport`] — an in-memory [`RealtimeTransport`] a test can
//! drive directly, standing in for a real websocket connection (spec §8,
//! scenario S5).

use aimq_core::realtime::{BroadcastMessage, RealtimeTransport};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Clone, Default)]
pub struct MockRealtimeTransport {
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<BroadcastMessage>>>>,
    presence_log: Arc<Mutex<Vec<Value>>>,
    connect_attempts: Arc<AtomicUsize>,
}

impl MockRealtimeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a broadcast as if it arrived over the wire. No-op before the
    /// service has called `connect()`.
    pub async fn fire(&self, msg: BroadcastMessage) {
        if let Some(tx) = self.outbound.lock().await.as_ref() {
            let _ = tx.send(msg);
        }
    }

    pub async fn presence_log(&self) -> Vec<Value> {
        self.presence_log.lock().await.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeTransport for MockRealtimeTransport {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<BroadcastMessage>> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().await = Some(tx);
        Ok(rx)
    }

    async fn publish_presence(&self, payload: Value) -> Result<()> {
        self.presence_log.lock().await.push(payload);
        Ok(())
    }

    async fn close(&self) {
        *self.outbound.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aimq_core::wake::WakeEvent;
    use aimq_core::realtime::RealtimeWakeupService;
    use std::time::Duration;

    #[tokio::test]
    async fn fired_broadcast_wakes_monitored_queue() {
        let transport = Arc::new(MockRealtimeTransport::new());
        let service = RealtimeWakeupService::start(transport.clone(), "peon", vec!["echo".to_string()]);
        let event = WakeEvent::new();
        service.register_worker_async(event.clone()).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.fire(BroadcastMessage { queue: "echo".to_string(), job_id: 42 }).await;

        tokio::time::timeout(Duration::from_millis(200), event.wait())
            .await
            .expect("broadcast for a monitored queue should wake the loop");
    }
}
