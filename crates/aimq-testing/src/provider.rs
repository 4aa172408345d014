//! [`MockQueueProvider`] — a deterministic, in-memory [`QueueProvider`] for
//! exercising the `Queue`/`WorkerLoop` retry and DLQ state machine without a
//! real PGMQ instance (spec §8 scenarios S1-S4).
//!
//! Unlike the real provider, visibility timeouts are not modeled: `read`
//! always returns the queue's front message (if any) and increments its
//! `read_ct`, which is exactly the redelivery behavior the seed scenarios
//! assert against ("simulate by having the mock increment `read_ct`").

use aimq_core::{Job, QueueInfo, QueueProvider};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

struct MockMessage {
    id: i64,
    data: Value,
    enqueued_at: chrono::DateTime<Utc>,
    read_ct: i32,
}

#[derive(Default)]
struct QueueState {
    messages: Mutex<VecDeque<MockMessage>>,
    archived: Mutex<Vec<i64>>,
    deleted: Mutex<Vec<i64>>,
}

/// Cloning shares the same underlying state (cheap `Arc`-backed `DashMap`),
/// so a test can hand one clone to the `Worker` and keep another for
/// assertions.
#[derive(Clone, Default)]
pub struct MockQueueProvider {
    queues: std::sync::Arc<DashMap<String, std::sync::Arc<QueueState>>>,
    next_id: std::sync::Arc<AtomicI64>,
}

impl MockQueueProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue: &str) -> std::sync::Arc<QueueState> {
        self.queues.entry(queue.to_string()).or_default().clone()
    }

    /// Seed a message directly, bypassing `send`, with an explicit starting
    /// `read_ct` — useful for constructing S2/S3-style scenarios where a
    /// job arrives mid-retry.
    pub async fn seed(&self, queue: &str, data: Value, read_ct: i32) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = self.state(queue);
        state.messages.lock().await.push_back(MockMessage { id, data, enqueued_at: Utc::now(), read_ct });
        id
    }

    pub async fn archived_ids(&self, queue: &str) -> Vec<i64> {
        self.state(queue).archived.lock().await.clone()
    }

    pub async fn deleted_ids(&self, queue: &str) -> Vec<i64> {
        self.state(queue).deleted.lock().await.clone()
    }

    pub async fn pending_count(&self, queue: &str) -> usize {
        self.state(queue).messages.lock().await.len()
    }
}

#[async_trait]
impl QueueProvider for MockQueueProvider {
    async fn send(&self, queue: &str, data: Value, _delay: Option<i64>) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = self.state(queue);
        state.messages.lock().await.push_back(MockMessage { id, data, enqueued_at: Utc::now(), read_ct: 0 });
        Ok(id)
    }

    async fn send_batch(&self, queue: &str, data: Vec<Value>, delay: Option<i64>) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(data.len());
        for item in data {
            ids.push(self.send(queue, item, delay).await?);
        }
        Ok(ids)
    }

    async fn read(&self, queue: &str, vt_seconds: i64, n: i64) -> Result<Vec<Job>> {
        let state = self.state(queue);
        let mut messages = state.messages.lock().await;
        let mut out = Vec::new();
        for msg in messages.iter_mut().take(n.max(0) as usize) {
            msg.read_ct += 1;
            out.push(Job::from_response(
                msg.id,
                msg.read_ct,
                msg.enqueued_at,
                Utc::now() + chrono::Duration::seconds(vt_seconds),
                msg.data.clone(),
                false,
            ));
        }
        Ok(out)
    }

    async fn pop(&self, queue: &str) -> Result<Option<Job>> {
        let state = self.state(queue);
        let mut messages = state.messages.lock().await;
        Ok(messages.pop_front().map(|msg| {
            Job::from_response(msg.id, msg.read_ct + 1, msg.enqueued_at, Utc::now(), msg.data, true)
        }))
    }

    async fn archive(&self, queue: &str, id: i64) -> Result<bool> {
        let state = self.state(queue);
        let mut messages = state.messages.lock().await;
        let found = remove_message(&mut messages, id);
        if found {
            state.archived.lock().await.push(id);
        }
        Ok(found)
    }

    async fn delete(&self, queue: &str, id: i64) -> Result<bool> {
        let state = self.state(queue);
        let mut messages = state.messages.lock().await;
        let found = remove_message(&mut messages, id);
        if found {
            state.deleted.lock().await.push(id);
        }
        Ok(found)
    }

    async fn create_queue(&self, queue: &str, _with_realtime: bool) -> Result<()> {
        self.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
        let mut out = Vec::new();
        for entry in self.queues.iter() {
            let messages = entry.value().messages.lock().await;
            out.push(QueueInfo {
                queue_name: entry.key().clone(),
                realtime_enabled: false,
                queue_length: messages.len() as i64,
                total_messages: messages.len() as i64,
            });
        }
        Ok(out)
    }

    async fn enable_queue_realtime(&self, _queue: &str) -> Result<()> {
        Ok(())
    }

    async fn disable_queue_realtime(&self, _queue: &str) -> Result<()> {
        Ok(())
    }
}

fn remove_message(messages: &mut VecDeque<MockMessage>, id: i64) -> bool {
    if let Some(pos) = messages.iter().position(|m| m.id == id) {
        messages.remove(pos);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_increments_read_ct_each_call() {
        let provider = MockQueueProvider::new();
        provider.send("echo", serde_json::json!({"x": 1}), None).await.unwrap();

        let first = provider.read("echo", 30, 1).await.unwrap();
        assert_eq!(first[0].attempt, 1);

        let second = provider.read("echo", 30, 1).await.unwrap();
        assert_eq!(second[0].attempt, 2);
    }

    #[tokio::test]
    async fn archive_removes_message_and_records_id() {
        let provider = MockQueueProvider::new();
        let id = provider.send("echo", serde_json::json!({}), None).await.unwrap();
        assert!(provider.archive("echo", id).await.unwrap());
        assert_eq!(provider.archived_ids("echo").await, vec![id]);
        assert_eq!(provider.pending_count("echo").await, 0);
    }

    #[tokio::test]
    async fn pop_removes_immediately() {
        let provider = MockQueueProvider::new();
        provider.send("echo", serde_json::json!({}), None).await.unwrap();
        let job = provider.pop("echo").await.unwrap().unwrap();
        assert!(job.popped);
        assert_eq!(provider.pending_count("echo").await, 0);
    }
}
