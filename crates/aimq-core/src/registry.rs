//! [`WorkerRegistry`] — an ordered queue-name -> [`Queue`] mapping (spec §4.2
//! glossary: "Order is preserved because it determines round-robin
//! precedence").
//!
//! A `Vec` holding registration order plus a `HashMap` for name lookup,
//! rather than pulling in an ordered-map crate the teacher's stack doesn't
//! already carry.

use crate::queue::Queue;
use std::collections::HashMap;

#[derive(Default)]
pub struct WorkerRegistry {
    order: Vec<String>,
    by_name: HashMap<String, Queue>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the queue bound to `name`. Replacing an existing
    /// name keeps its original position in round-robin order.
    pub fn insert(&mut self, name: impl Into<String>, queue: Queue) {
        let name = name.into();
        if !self.by_name.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.by_name.insert(name, queue);
    }

    pub fn get(&self, name: &str) -> Option<&Queue> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Queue names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Iterate queues in registration order — the round-robin schedule.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Queue)> {
        self.order.iter().map(move |name| (name.as_str(), self.by_name.get(name).unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::QueueProvider;
    use crate::runnable::{FnRunnable, Runnable};
    use std::sync::Arc;

    fn dummy_queue(name: &str) -> Queue {
        struct NoopProvider;
        #[async_trait::async_trait]
        impl QueueProvider for NoopProvider {
            async fn send(&self, _: &str, _: serde_json::Value, _: Option<i64>) -> anyhow::Result<i64> {
                unimplemented!()
            }
            async fn send_batch(&self, _: &str, _: Vec<serde_json::Value>, _: Option<i64>) -> anyhow::Result<Vec<i64>> {
                unimplemented!()
            }
            async fn read(&self, _: &str, _: i64, _: i64) -> anyhow::Result<Vec<crate::job::Job>> {
                unimplemented!()
            }
            async fn pop(&self, _: &str) -> anyhow::Result<Option<crate::job::Job>> {
                unimplemented!()
            }
            async fn archive(&self, _: &str, _: i64) -> anyhow::Result<bool> {
                unimplemented!()
            }
            async fn delete(&self, _: &str, _: i64) -> anyhow::Result<bool> {
                unimplemented!()
            }
            async fn create_queue(&self, _: &str, _: bool) -> anyhow::Result<()> {
                unimplemented!()
            }
            async fn list_queues(&self) -> anyhow::Result<Vec<crate::provider::QueueInfo>> {
                unimplemented!()
            }
            async fn enable_queue_realtime(&self, _: &str) -> anyhow::Result<()> {
                unimplemented!()
            }
            async fn disable_queue_realtime(&self, _: &str) -> anyhow::Result<()> {
                unimplemented!()
            }
        }

        let runnable: Arc<dyn Runnable> =
            Arc::new(FnRunnable::new(name.to_string(), |input, _cfg| async move { Ok(input) }));
        Queue::new(name, Arc::new(NoopProvider), runnable, Default::default())
    }

    #[test]
    fn preserves_registration_order() {
        let mut registry = WorkerRegistry::new();
        registry.insert("b", dummy_queue("b"));
        registry.insert("a", dummy_queue("a"));
        registry.insert("c", dummy_queue("c"));
        assert_eq!(registry.names(), &["b".to_string(), "a".to_string(), "c".to_string()]);
    }

    #[test]
    fn replacing_keeps_position() {
        let mut registry = WorkerRegistry::new();
        registry.insert("a", dummy_queue("a"));
        registry.insert("b", dummy_queue("b"));
        registry.insert("a", dummy_queue("a"));
        assert_eq!(registry.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len(), 2);
    }
}
