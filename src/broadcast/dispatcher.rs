use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::broadcast::job::{BroadcastJob, ContentKind, JobStatus};
use crate::broadcast::rate_limit::RateLimiter;
use crate::broadcast::store::JobStore;
use crate::broadcast::transport::{BroadcastTransport, SendError};

pub const DEFAULT_CHECKPOINT_EVERY: u32 = 50;

/// Sequential per-job send worker. One dispatcher drives one job; several
/// jobs run as independent dispatchers that only meet inside the shared
/// rate limiter.
pub struct Dispatcher {
    transport: Arc<dyn BroadcastTransport>,
    store: Arc<dyn JobStore>,
    limiter: Arc<RateLimiter>,
    checkpoint_every: u32,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn BroadcastTransport>,
        store: Arc<dyn JobStore>,
        limiter: Arc<RateLimiter>,
        checkpoint_every: u32,
    ) -> Self {
        Self {
            transport,
            store,
            limiter,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    /// Attempts every recipient once, in the supplied order. A failed send
    /// is counted and contained; only the terminal persistence write can
    /// fail the run itself. The caller has already moved the job to
    /// `Sending` and fixed `total`.
    pub async fn run(
        &self,
        job: &mut BroadcastJob,
        recipients: &[i64],
        cancel: &CancellationToken,
    ) -> Result<()> {
        log::info!(
            "broadcast {}: dispatching to {} recipients",
            job.id,
            recipients.len()
        );

        for recipient in recipients {
            // Cooperative stop, observed once per recipient. A send
            // already in flight finishes first.
            if cancel.is_cancelled() {
                job.status = JobStatus::Stopped;
                break;
            }

            self.limiter.acquire(*recipient).await;

            match self.deliver(job, *recipient).await {
                Ok(()) => job.sent += 1,
                Err(e) => {
                    log::warn!("broadcast {}: send to {} failed: {}", job.id, recipient, e);
                    job.failed += 1;
                }
            }

            if job.attempted() % self.checkpoint_every == 0 {
                // A lost checkpoint only costs recovery granularity, so it
                // never stops the run.
                if let Err(e) = self.store.save(job).await {
                    log::warn!("broadcast {}: checkpoint save failed: {}", job.id, e);
                }
            }
        }

        if job.status != JobStatus::Stopped {
            job.status = JobStatus::Done;
        }

        // Terminal write happens unconditionally, even if a checkpoint
        // just fired.
        self.store.save(job).await?;

        log::info!(
            "broadcast {}: finished as '{}' (sent {}, failed {} of {})",
            job.id,
            job.status.as_str(),
            job.sent,
            job.failed,
            job.total
        );
        Ok(())
    }

    async fn deliver(&self, job: &BroadcastJob, recipient: i64) -> Result<(), SendError> {
        let text = job.text.as_deref().unwrap_or("");
        match job.content_kind {
            ContentKind::Text => self.transport.send_text(recipient, text, &job.buttons).await,
            ContentKind::Photo | ContentKind::Video => {
                let media = media_ref(job)?;
                let caption = job.text.as_deref().filter(|t| !t.is_empty());
                self.transport
                    .send_media(recipient, job.content_kind, media, caption, &job.buttons)
                    .await
            }
            ContentKind::VideoNote => {
                let media = media_ref(job)?;
                self.transport.send_media_note(recipient, media).await?;
                if !text.is_empty() {
                    // The follow-up body is one more message and pays the
                    // limiter again.
                    self.limiter.acquire(recipient).await;
                    self.transport.send_text(recipient, text, &job.buttons).await?;
                }
                Ok(())
            }
        }
    }
}

fn media_ref(job: &BroadcastJob) -> Result<&str, SendError> {
    job.media
        .as_deref()
        .ok_or_else(|| SendError::Rejected("media reference missing".to_string()))
}
