use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::broadcast::dispatcher::Dispatcher;
use crate::broadcast::job::{BroadcastJob, JobStatus, JobValidationError};
use crate::broadcast::rate_limit::RateLimiter;
use crate::broadcast::store::JobStore;
use crate::broadcast::transport::BroadcastTransport;

#[derive(Debug, Error)]
pub enum StartDispatchError {
    #[error(transparent)]
    Validation(#[from] JobValidationError),
    #[error("failed to persist job before dispatch: {0}")]
    Store(#[source] anyhow::Error),
}

/// Owns the live broadcasts: one open draft per admin, one cancellation
/// handle per running job. Dispatchers run as fire-and-forget tokio tasks;
/// each task removes its own handle entry when it exits, so a handle in
/// the map always points at a live run.
pub struct BroadcastSupervisor {
    transport: Arc<dyn BroadcastTransport>,
    store: Arc<dyn JobStore>,
    limiter: Arc<RateLimiter>,
    checkpoint_every: u32,
    drafts: Mutex<HashMap<i64, BroadcastJob>>,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl BroadcastSupervisor {
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
            checkpoint_every,
            drafts: Mutex::new(HashMap::new()),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the admin's open draft, creating one if none exists.
    /// Calling twice without an intervening dispatch returns the same job.
    pub async fn create_draft(&self, author: i64) -> BroadcastJob {
        let mut drafts = self.drafts.lock().await;
        drafts
            .entry(author)
            .or_insert_with(BroadcastJob::draft)
            .clone()
    }

    /// Replaces the admin's draft wholesale. A second authoring flow
    /// overwrites, never merges.
    pub async fn update_draft(&self, author: i64, job: BroadcastJob) {
        self.drafts.lock().await.insert(author, job);
    }

    pub async fn clear_draft(&self, author: i64) -> Option<BroadcastJob> {
        self.drafts.lock().await.remove(&author)
    }

    /// Validates the job, fixes `total`, persists the `Sending` record and
    /// schedules the dispatcher in the background. On any error nothing is
    /// scheduled and the caller's job is still pending.
    pub async fn start_dispatch(
        &self,
        mut job: BroadcastJob,
        recipients: Vec<i64>,
    ) -> Result<Uuid, StartDispatchError> {
        job.validate_for_dispatch(recipients.len())?;

        job.total = recipients.len() as u32;
        job.sent = 0;
        job.failed = 0;
        job.status = JobStatus::Sending;
        self.store
            .save(&job)
            .await
            .map_err(StartDispatchError::Store)?;

        let cancel = CancellationToken::new();
        self.active.lock().await.insert(job.id, cancel.clone());

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            Arc::clone(&self.limiter),
            self.checkpoint_every,
        );
        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.active);
        let id = job.id;

        tokio::spawn(async move {
            let run = AssertUnwindSafe(dispatcher.run(&mut job, &recipients, &cancel))
                .catch_unwind()
                .await;
            match run {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::error!("broadcast {}: dispatch error: {}", id, e);
                    force_terminal(store.as_ref(), &mut job).await;
                }
                Err(_) => {
                    log::error!("broadcast {}: dispatch task panicked", id);
                    force_terminal(store.as_ref(), &mut job).await;
                }
            }
            // The handle is only removed here, after the dispatcher has
            // observed any stop signal and exited.
            active.lock().await.remove(&id);
        });

        Ok(id)
    }

    /// Signals the job's cancellation handle. Returns false (not an error)
    /// if the job already finished or was never started.
    pub async fn stop(&self, id: Uuid) -> bool {
        match self.active.lock().await.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signals every running job; returns how many were signaled.
    pub async fn stop_all(&self) -> usize {
        let active = self.active.lock().await;
        for token in active.values() {
            token.cancel();
        }
        active.len()
    }

    pub async fn active_jobs(&self) -> Vec<Uuid> {
        self.active.lock().await.keys().copied().collect()
    }
}

/// Last-resort cleanup for a run that died abnormally: never leave a job
/// without a terminal status.
async fn force_terminal(store: &dyn JobStore, job: &mut BroadcastJob) {
    if !job.status.is_terminal() {
        job.status = JobStatus::Stopped;
    }
    if let Err(e) = store.save(job).await {
        log::error!("broadcast {}: failed to persist terminal state: {}", job.id, e);
    }
}
