pub mod dispatcher;
pub mod job;
pub mod rate_limit;
pub mod store;
pub mod supervisor;
pub mod transport;

pub use dispatcher::{DEFAULT_CHECKPOINT_EVERY, Dispatcher};
pub use job::{BroadcastJob, ButtonTarget, ContentKind, InlineButton, JobStatus};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use store::{JobStore, SqliteJobStore};
pub use supervisor::{BroadcastSupervisor, StartDispatchError};
pub use transport::{BroadcastTransport, SendError};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::job::{BroadcastJob, ContentKind, InlineButton, JobStatus};
    use super::store::JobStore;
    use super::transport::{BroadcastTransport, SendError};

    #[derive(Clone, Debug, PartialEq)]
    pub struct SentMessage {
        pub recipient: i64,
        pub kind: &'static str,
        pub text: Option<String>,
    }

    /// Transport double: records every send, can fail chosen recipients,
    /// and can flip a cancellation token after the nth delivered message.
    #[derive(Default)]
    pub struct RecordingTransport {
        sends: std::sync::Mutex<Vec<SentMessage>>,
        fail_for: std::sync::Mutex<HashSet<i64>>,
        cancel_after: std::sync::Mutex<Option<(usize, CancellationToken)>>,
    }

    impl RecordingTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail_recipient(&self, recipient: i64) {
            self.fail_for.lock().unwrap().insert(recipient);
        }

        pub fn cancel_when_sent(&self, count: usize, token: CancellationToken) {
            *self.cancel_after.lock().unwrap() = Some((count, token));
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sends.lock().unwrap().clone()
        }

        fn record(
            &self,
            recipient: i64,
            kind: &'static str,
            text: Option<String>,
        ) -> Result<(), SendError> {
            if self.fail_for.lock().unwrap().contains(&recipient) {
                return Err(SendError::Unreachable(recipient, "blocked".to_string()));
            }
            let delivered = {
                let mut sends = self.sends.lock().unwrap();
                sends.push(SentMessage {
                    recipient,
                    kind,
                    text,
                });
                sends.len()
            };
            if let Some((count, token)) = &*self.cancel_after.lock().unwrap() {
                if delivered >= *count {
                    token.cancel();
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BroadcastTransport for RecordingTransport {
        async fn send_text(
            &self,
            recipient: i64,
            text: &str,
            _buttons: &[InlineButton],
        ) -> Result<(), SendError> {
            self.record(recipient, "text", Some(text.to_string()))
        }

        async fn send_media(
            &self,
            recipient: i64,
            kind: ContentKind,
            _media: &str,
            caption: Option<&str>,
            _buttons: &[InlineButton],
        ) -> Result<(), SendError> {
            self.record(recipient, kind.as_str(), caption.map(str::to_string))
        }

        async fn send_media_note(&self, recipient: i64, _media: &str) -> Result<(), SendError> {
            self.record(recipient, "video_note", None)
        }
    }

    /// In-memory store double with a save counter and an optional failure
    /// switch for checkpoint-error tests.
    #[derive(Default)]
    pub struct MemoryJobStore {
        jobs: std::sync::Mutex<HashMap<Uuid, BroadcastJob>>,
        saves: AtomicU32,
        failing: AtomicBool,
    }

    impl MemoryJobStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail_saves(&self, fail: bool) {
            self.failing.store(fail, Ordering::SeqCst);
        }

        pub fn save_count(&self) -> u32 {
            self.saves.load(Ordering::SeqCst)
        }

        pub fn get(&self, id: Uuid) -> Option<BroadcastJob> {
            self.jobs.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn save(&self, job: &BroadcastJob) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow!("store unavailable"));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.jobs.lock().unwrap().insert(job.id, job.clone());
            Ok(())
        }

        async fn load(&self, id: Uuid) -> Result<Option<BroadcastJob>> {
            Ok(self.get(id))
        }

        async fn list_active(&self) -> Result<Vec<BroadcastJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Sending))
                .cloned()
                .collect())
        }
    }
}
