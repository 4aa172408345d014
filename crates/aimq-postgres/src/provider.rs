//! [`PgmqProvider`] — a [`aimq_core::QueueProvider`] backed directly by the
//! `pgmq_public` schema functions over `sqlx`.
//!
//! Grounded in `examples/crcn-seesaw-rs/crates/seesaw-job-postgres/src/lib.rs`'s
//! `PgJobStore` (pool ownership, `sqlx::query` + `Row::get` decoding, the
//! `anyhow::Result` return convention); the actual SQL surface is PGMQ's own
//! `pgmq_public` wrapper functions rather than a hand-rolled `jobs` table,
//! per `examples/original_source/src/aimq/providers/supabase.py`'s `_rpc`
//! calls (`pgmq_public.send`, `.read`, `.pop`, `.archive`, `.delete`, plus
//! the admin functions). The Python client's PostgREST-JSON-parsing
//! workaround in `_rpc` has no counterpart here: `sqlx` decodes rows
//! directly, it never round-trips through a REST JSON envelope.

use crate::error::PgmqError;
use aimq_core::{Job, QueueInfo, QueueProvider};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgmqProvider {
    pool: PgPool,
}

impl PgmqProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Establishes the connection pool against `database_url`. Kept distinct
    /// from [`PgmqProvider::new`] so a caller that already owns a `PgPool`
    /// (e.g. shared with other subsystems) can skip straight to that
    /// constructor; this one is for the common case of the provider owning
    /// its own pool, and surfaces setup failures as a matchable
    /// [`PgmqError`] rather than the generic `anyhow::Result` every
    /// `QueueProvider` call returns.
    pub async fn connect(database_url: &str) -> Result<Self, PgmqError> {
        let pool = PgPool::connect(database_url).await.map_err(PgmqError::Connect)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_job(row: &sqlx::postgres::PgRow, popped: bool) -> Job {
        let msg_id: i64 = row.get("msg_id");
        let read_ct: i32 = row.get("read_ct");
        let enqueued_at: DateTime<Utc> = row.get("enqueued_at");
        let vt: DateTime<Utc> = row.get("vt");
        let message: Value = row.get("message");
        Job::from_response(msg_id, read_ct, enqueued_at, vt, message, popped)
    }
}

#[async_trait]
impl QueueProvider for PgmqProvider {
    async fn send(&self, queue: &str, data: Value, delay: Option<i64>) -> Result<i64> {
        let row = sqlx::query("SELECT * FROM pgmq_public.send($1, $2, $3)")
            .bind(queue)
            .bind(data)
            .bind(delay.unwrap_or(0))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn send_batch(&self, queue: &str, data: Vec<Value>, delay: Option<i64>) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT * FROM pgmq_public.send_batch($1, $2, $3)")
            .bind(queue)
            .bind(&data)
            .bind(delay.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    async fn read(&self, queue: &str, vt_seconds: i64, n: i64) -> Result<Vec<Job>> {
        match sqlx::query("SELECT * FROM pgmq_public.read($1, $2, $3)")
            .bind(queue)
            .bind(vt_seconds as i32)
            .bind(n as i32)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => Ok(rows.iter().map(|row| Self::row_to_job(row, false)).collect()),
            Err(e) if is_queue_not_found(&e) => {
                Err(aimq_core::AimqError::QueueNotFound(queue.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pop(&self, queue: &str) -> Result<Option<Job>> {
        match sqlx::query("SELECT * FROM pgmq_public.pop($1)")
            .bind(queue)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => Ok(row.as_ref().map(|r| Self::row_to_job(r, true))),
            Err(e) if is_queue_not_found(&e) => {
                Err(aimq_core::AimqError::QueueNotFound(queue.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn archive(&self, queue: &str, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT * FROM pgmq_public.archive($1, $2)")
            .bind(queue)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>(0))
    }

    async fn delete(&self, queue: &str, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT * FROM pgmq_public.delete($1, $2)")
            .bind(queue)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>(0))
    }

    async fn create_queue(&self, queue: &str, with_realtime: bool) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)").bind(queue).execute(&self.pool).await?;
        if with_realtime {
            self.enable_queue_realtime(queue).await?;
        }
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                q.queue_name,
                COALESCE(m.realtime_enabled, false) AS realtime_enabled,
                q.queue_length,
                q.total_messages
            FROM pgmq.metrics_all() AS q
            LEFT JOIN aimq_queue_realtime AS m ON m.queue_name = q.queue_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| QueueInfo {
                queue_name: row.get("queue_name"),
                realtime_enabled: row.get("realtime_enabled"),
                queue_length: row.get("queue_length"),
                total_messages: row.get("total_messages"),
            })
            .collect())
    }

    async fn enable_queue_realtime(&self, queue: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aimq_queue_realtime (queue_name, realtime_enabled)
            VALUES ($1, true)
            ON CONFLICT (queue_name) DO UPDATE SET realtime_enabled = true
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn disable_queue_realtime(&self, queue: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aimq_queue_realtime (queue_name, realtime_enabled)
            VALUES ($1, false)
            ON CONFLICT (queue_name) DO UPDATE SET realtime_enabled = false
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_queue_not_found(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            db_err.message().contains("does not exist") || db_err.message().contains("relation")
        }
        _ => false,
    }
}
