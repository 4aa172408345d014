//! [`SupabaseRealtimeTransport`] — drives the same Phoenix-channel-over-
//! websocket protocol `examples/original_source/src/aimq/realtime.py`'s
//! async client speaks, implemented against `tokio-tungstenite` instead of
//! the Python `realtime` package.
//!
//! Phoenix wire format: every frame is a 5-tuple
//! `[join_ref, ref, topic, event, payload]`. We join once per `connect()`
//! call (the service itself owns reconnect-with-backoff, see
//! `aimq_core::realtime::RealtimeWakeupService::run`), forward `broadcast`
//! events whose inner payload matches `{event: <configured>, payload: {...}}`
//! to the channel, and push presence updates with Phoenix's `track` event.

use aimq_core::realtime::{BroadcastMessage, RealtimeTransport};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub struct SupabaseRealtimeTransport {
    url: String,
    api_key: String,
    channel: String,
    event: String,
    sink: Mutex<Option<futures::stream::SplitSink<WsStream, Message>>>,
    join_ref: std::sync::atomic::AtomicU64,
}

impl SupabaseRealtimeTransport {
    pub fn new(
        supabase_url: impl Into<String>,
        supabase_key: impl Into<String>,
        channel: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            url: supabase_url.into(),
            api_key: supabase_key.into(),
            channel: channel.into(),
            event: event.into(),
            sink: Mutex::new(None),
            join_ref: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn websocket_url(&self) -> String {
        let base = self
            .url
            .replace("https://", "wss://")
            .replace("http://", "ws://");
        format!("{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.api_key)
    }

    fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }

    fn next_ref(&self) -> u64 {
        self.join_ref.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeTransport for SupabaseRealtimeTransport {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<BroadcastMessage>> {
        let url = self.websocket_url();
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .context("realtime websocket connect failed")?;
        let (mut sink, mut stream) = ws.split();

        let join_frame = json!([
            self.next_ref().to_string(),
            self.next_ref().to_string(),
            self.topic(),
            "phx_join",
            { "config": { "broadcast": { "self": false }, "presence": { "key": "" } } },
        ]);
        sink.send(Message::Text(join_frame.to_string()))
            .await
            .context("failed to send phx_join")?;
        tracing::debug!(channel = %self.channel, "joined realtime channel");

        *self.sink.lock().await = Some(sink);

        let (tx, rx) = mpsc::unbounded_channel();
        let event_name = self.event.clone();
        let channel_topic = self.topic();

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                let Ok(parsed) = serde_json::from_str::<Value>(&text) else { continue };
                let Some(frame) = parsed.as_array() else { continue };
                if frame.len() < 5 {
                    continue;
                }

                let topic = frame[2].as_str().unwrap_or_default();
                let event = frame[3].as_str().unwrap_or_default();
                if topic != channel_topic || event != "broadcast" {
                    continue;
                }

                let payload = &frame[4];
                if payload.get("event").and_then(Value::as_str) != Some(event_name.as_str()) {
                    continue;
                }

                let Some(inner) = payload.get("payload") else { continue };
                let queue = inner.get("queue").and_then(Value::as_str).map(str::to_string);
                let job_id = inner.get("job_id").and_then(Value::as_i64);

                if let (Some(queue), Some(job_id)) = (queue, job_id) {
                    if tx.send(BroadcastMessage { queue, job_id }).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn publish_presence(&self, payload: Value) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or_else(|| anyhow!("realtime transport not connected"))?;

        let frame = json!([
            self.next_ref().to_string(),
            self.next_ref().to_string(),
            self.topic(),
            "presence",
            { "type": "presence", "event": "track", "payload": payload },
        ]);
        sink.send(Message::Text(frame.to_string()))
            .await
            .context("failed to publish presence")?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
            tracing::debug!(channel = %self.channel, "closed realtime channel");
        }
    }
}
