//! PostgreSQL/PGMQ implementation of the `aimq-core` provider and realtime
//! transport interfaces.
//!
//! # Database prerequisites
//!
//! The [`pgmq` extension](https://github.com/tembo-io/pgmq) must be
//! installed, along with its `pgmq_public` wrapper schema (the same one
//! Supabase's Postgres image ships, and the one
//! `examples/original_source/src/aimq/providers/supabase.py` drives via
//! PostgREST). [`PgmqProvider::create_queue`] additionally tracks
//! per-queue realtime-trigger state in a small side table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS aimq_queue_realtime (
//!     queue_name TEXT PRIMARY KEY,
//!     realtime_enabled BOOLEAN NOT NULL DEFAULT false
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use aimq_postgres::{PgmqProvider, SupabaseRealtimeTransport};
//!
//! let provider = PgmqProvider::connect("postgres://localhost/mydb").await?;
//!
//! let transport = SupabaseRealtimeTransport::new(
//!     "https://project.supabase.co",
//!     "service-role-key",
//!     "aimq:jobs",
//!     "job_enqueued",
//! );
//! ```

mod error;
mod provider;
mod realtime;

pub use error::PgmqError;
pub use provider::PgmqProvider;
pub use realtime::SupabaseRealtimeTransport;
