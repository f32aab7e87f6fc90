use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params, types::Type};
use uuid::Uuid;

use crate::broadcast::job::{BroadcastJob, ContentKind, JobStatus};
use crate::database::DatabasePool;

/// Durable home for job records. `save` is an upsert by job id; the
/// dispatcher calls it for checkpoints and the terminal write, monitoring
/// surfaces use the read side.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, job: &BroadcastJob) -> Result<()>;
    async fn load(&self, id: Uuid) -> Result<Option<BroadcastJob>>;
    async fn list_active(&self) -> Result<Vec<BroadcastJob>>;
}

pub struct SqliteJobStore {
    pool: Arc<DatabasePool>,
}

impl SqliteJobStore {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }
}

fn bad_column(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<BroadcastJob> {
    let id: String = row.get(0)?;
    let content_kind: String = row.get(1)?;
    let buttons: String = row.get(4)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(9)?;

    Ok(BroadcastJob {
        id: Uuid::parse_str(&id).map_err(|e| bad_column(0, e))?,
        content_kind: ContentKind::parse(&content_kind).ok_or_else(|| {
            bad_column(
                1,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "unknown content kind"),
            )
        })?,
        text: row.get(2)?,
        media: row.get(3)?,
        buttons: serde_json::from_str(&buttons).map_err(|e| bad_column(4, e))?,
        status: JobStatus::parse(&status).ok_or_else(|| {
            bad_column(
                5,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "unknown job status"),
            )
        })?,
        total: row.get(6)?,
        sent: row.get(7)?,
        failed: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| bad_column(9, e))?
            .with_timezone(&Utc),
    })
}

const JOB_COLUMNS: &str =
    "id, content_kind, text, media, buttons, status, total, sent, failed, created_at";

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &BroadcastJob) -> Result<()> {
        let id = job.id.to_string();
        let content_kind = job.content_kind.as_str();
        let text = job.text.clone();
        let media = job.media.clone();
        let buttons = serde_json::to_string(&job.buttons)?;
        let status = job.status.as_str();
        let (total, sent, failed) = (job.total, job.sent, job.failed);
        let created_at = job.created_at.to_rfc3339();

        self.pool
            .execute_with_timeout(move |conn| {
                conn.execute(
                    "INSERT INTO broadcast_jobs
                         (id, content_kind, text, media, buttons, status, total, sent, failed, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(id) DO UPDATE SET
                         content_kind = excluded.content_kind,
                         text = excluded.text,
                         media = excluded.media,
                         buttons = excluded.buttons,
                         status = excluded.status,
                         total = excluded.total,
                         sent = excluded.sent,
                         failed = excluded.failed",
                    params![id, content_kind, text, media, buttons, status, total, sent, failed, created_at],
                )
            })
            .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<BroadcastJob>> {
        let id = id.to_string();
        let job = self
            .pool
            .execute_with_timeout(move |conn| {
                conn.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM broadcast_jobs WHERE id = ?1"),
                    params![id],
                    row_to_job,
                )
                .optional()
            })
            .await?;
        Ok(job)
    }

    async fn list_active(&self) -> Result<Vec<BroadcastJob>> {
        let jobs = self
            .pool
            .execute_with_timeout(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM broadcast_jobs
                     WHERE status IN ('pending', 'sending')
                     ORDER BY created_at"
                ))?;
                let rows = stmt.query_map([], row_to_job)?;
                let mut jobs = Vec::new();
                for job in rows {
                    jobs.push(job?);
                }
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }
}
