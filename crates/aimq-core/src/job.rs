//! The [`Job`] value type returned by a [`crate::provider::QueueProvider`].

use chrono::{DateTime, Utc};
use serde_json::Value;

/// An immutable record produced by the provider for one `read`/`pop`.
///
/// Constructed from a provider response; never mutated by the core after
/// construction (the retry/DLQ state machine in [`crate::queue::Queue`]
/// depends on this — see the test suite for invariant coverage).
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique id within the provider (pgmq's `msg_id`).
    pub id: i64,
    /// Read count; starts at 1 on first read. Equals pgmq's `read_ct`.
    pub attempt: i32,
    /// When the message was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// When the provider will re-expose this message if not finalized.
    pub visible_at: DateTime<Utc>,
    /// Opaque JSON payload.
    pub data: Value,
    /// True iff fetched via `pop` — the provider has already removed it, so
    /// no archive/delete is required to finalize.
    pub popped: bool,
}

impl Job {
    /// Build a `Job` from a provider response.
    ///
    /// `popped` is supplied by the caller rather than read off the response,
    /// since pop and read return the same row shape.
    pub fn from_response(
        msg_id: i64,
        read_ct: i32,
        enqueued_at: DateTime<Utc>,
        vt: DateTime<Utc>,
        message: Value,
        popped: bool,
    ) -> Self {
        Self {
            id: msg_id,
            attempt: read_ct.max(1),
            enqueued_at,
            visible_at: vt,
            data: message,
            popped,
        }
    }

    /// The `thread_id` carried in the payload, if the caller supplied one.
    pub fn thread_id(&self) -> Option<String> {
        self.data.get("thread_id").and_then(Value::as_str).map(str::to_owned)
    }

    /// The payload with `thread_id` removed (it is moved into the runtime
    /// config, not duplicated into the Runnable's input).
    pub fn data_without_thread_id(&self) -> Value {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.remove("thread_id");
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn attempt_floors_at_one() {
        let job = Job::from_response(1, 0, now(), now(), serde_json::json!({}), false);
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn thread_id_extracted_and_stripped() {
        let job = Job::from_response(
            1,
            1,
            now(),
            now(),
            serde_json::json!({"thread_id": "abc", "x": 1}),
            false,
        );
        assert_eq!(job.thread_id(), Some("abc".to_string()));
        assert_eq!(job.data_without_thread_id(), serde_json::json!({"x": 1}));
    }

    #[test]
    fn thread_id_absent_is_none() {
        let job = Job::from_response(1, 1, now(), now(), serde_json::json!({"x": 1}), false);
        assert_eq!(job.thread_id(), None);
        assert_eq!(job.data_without_thread_id(), serde_json::json!({"x": 1}));
    }

    #[test]
    fn popped_flag_preserved() {
        let job = Job::from_response(1, 1, now(), now(), serde_json::json!({}), true);
        assert!(job.popped);
    }
}
