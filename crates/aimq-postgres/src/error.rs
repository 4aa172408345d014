//! Error taxonomy for this crate's own boundary, mirroring the split
//! `aimq_core::error::AimqError` uses: a `thiserror`-derived enum for the one
//! failure mode a caller plausibly wants to match on (pool/connection setup
//! failing before a [`crate::PgmqProvider`] even exists), `anyhow::Result`
//! everywhere else — every `QueueProvider` method already returns
//! `anyhow::Result` per the trait in `aimq-core`, so per-call SQL failures
//! stay on that path rather than being wrapped here.

use thiserror::Error;

/// Errors raised establishing a connection to Postgres, before any
/// `QueueProvider` call is made.
#[derive(Debug, Error)]
pub enum PgmqError {
    /// The connection pool could not be established against `database_url`.
    #[error("failed to connect to Postgres: {0}")]
    Connect(#[source] sqlx::Error),
}
