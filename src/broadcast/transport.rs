use async_trait::async_trait;
use thiserror::Error;

use crate::broadcast::job::{ContentKind, InlineButton};

/// Typed delivery failure. The dispatcher treats every variant the same
/// way (count as failed, move on), but callers logging errors get to see
/// what actually happened.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("recipient {0} unreachable: {1}")]
    Unreachable(i64, String),
    #[error("payload rejected: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
}

/// The outbound messaging channel a broadcast is delivered through.
///
/// Implementations do the raw send only; rate limiting and retry policy
/// live with the caller.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn send_text(
        &self,
        recipient: i64,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), SendError>;

    /// `kind` is `Photo` or `Video`; anything else is a caller bug and
    /// comes back as `Rejected`.
    async fn send_media(
        &self,
        recipient: i64,
        kind: ContentKind,
        media: &str,
        caption: Option<&str>,
        buttons: &[InlineButton],
    ) -> Result<(), SendError>;

    async fn send_media_note(&self, recipient: i64, media: &str) -> Result<(), SendError>;
}
