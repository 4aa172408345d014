//! In-memory fakes for exercising `aimq-core` without a live Postgres/PGMQ
//! instance or a real realtime connection.

mod provider;
mod realtime;

pub use provider::MockQueueProvider;
pub use realtime::MockRealtimeTransport;
