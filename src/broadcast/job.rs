use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// What kind of payload a broadcast carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    VideoNote,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::VideoNote => "video_note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ContentKind::Text),
            "photo" => Some(ContentKind::Photo),
            "video" => Some(ContentKind::Video),
            "video_note" => Some(ContentKind::VideoNote),
            _ => None,
        }
    }

    pub fn requires_media(&self) -> bool {
        !matches!(self, ContentKind::Text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Draft,
    Pending,
    Sending,
    Stopped,
    Done,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Pending => "pending",
            JobStatus::Sending => "sending",
            JobStatus::Stopped => "stopped",
            JobStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(JobStatus::Draft),
            "pending" => Some(JobStatus::Pending),
            "sending" => Some(JobStatus::Sending),
            "stopped" => Some(JobStatus::Stopped),
            "done" => Some(JobStatus::Done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Stopped | JobStatus::Done)
    }
}

/// One inline control under the broadcast message. Targets are either a
/// plain URL or an in-app web view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub target: ButtonTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonTarget {
    Url(String),
    WebApp(String),
}

#[derive(Debug, Error)]
pub enum JobValidationError {
    #[error("job is '{}', expected 'pending'", .0.as_str())]
    NotPending(JobStatus),
    #[error("recipient list is empty")]
    NoRecipients,
    #[error("'{}' broadcast requires a media reference", .0.as_str())]
    MissingMedia(ContentKind),
    #[error("text broadcast requires a non-empty body")]
    EmptyText,
}

/// One authored broadcast. Immutable after dispatch starts except for the
/// three counters and `status`, which only the dispatcher driving the job
/// may touch.
#[derive(Clone, Debug)]
pub struct BroadcastJob {
    pub id: Uuid,
    pub content_kind: ContentKind,
    pub text: Option<String>,
    pub media: Option<String>,
    pub buttons: Vec<InlineButton>,
    pub status: JobStatus,
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
    pub created_at: DateTime<Utc>,
}

impl BroadcastJob {
    pub fn draft() -> Self {
        Self {
            id: Uuid::new_v4(),
            content_kind: ContentKind::Text,
            text: Some("📢 Your broadcast text here...".to_string()),
            media: None,
            buttons: Vec::new(),
            status: JobStatus::Draft,
            total: 0,
            sent: 0,
            failed: 0,
            created_at: Utc::now(),
        }
    }

    /// A ready-to-dispatch text broadcast.
    pub fn text_message(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_kind: ContentKind::Text,
            text: Some(body.into()),
            media: None,
            buttons: Vec::new(),
            status: JobStatus::Pending,
            total: 0,
            sent: 0,
            failed: 0,
            created_at: Utc::now(),
        }
    }

    pub fn attempted(&self) -> u32 {
        self.sent + self.failed
    }

    /// Pre-dispatch shape check. Nothing is mutated on failure, so a
    /// rejected job can be corrected and retried.
    pub fn validate_for_dispatch(&self, recipient_count: usize) -> Result<(), JobValidationError> {
        if self.status != JobStatus::Pending {
            return Err(JobValidationError::NotPending(self.status));
        }
        if recipient_count == 0 {
            return Err(JobValidationError::NoRecipients);
        }
        if self.content_kind.requires_media() && self.media.is_none() {
            return Err(JobValidationError::MissingMedia(self.content_kind));
        }
        if self.content_kind == ContentKind::Text
            && self.text.as_deref().unwrap_or("").trim().is_empty()
        {
            return Err(JobValidationError::EmptyText);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Draft,
            JobStatus::Pending,
            JobStatus::Sending,
            JobStatus::Stopped,
            JobStatus::Done,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_content_kind_round_trip() {
        assert_eq!(ContentKind::parse("video_note"), Some(ContentKind::VideoNote));
        assert_eq!(ContentKind::VideoNote.as_str(), "video_note");
        assert_eq!(ContentKind::parse("gif"), None);
    }

    #[test]
    fn test_validate_text_job() {
        let job = BroadcastJob::text_message("hello");
        assert!(job.validate_for_dispatch(3).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_recipient_list() {
        let job = BroadcastJob::text_message("hello");
        assert!(matches!(
            job.validate_for_dispatch(0),
            Err(JobValidationError::NoRecipients)
        ));
    }

    #[test]
    fn test_validate_rejects_draft_status() {
        let job = BroadcastJob::draft();
        assert!(matches!(
            job.validate_for_dispatch(1),
            Err(JobValidationError::NotPending(JobStatus::Draft))
        ));
    }

    #[test]
    fn test_validate_rejects_photo_without_media() {
        let mut job = BroadcastJob::text_message("caption");
        job.content_kind = ContentKind::Photo;
        assert!(matches!(
            job.validate_for_dispatch(5),
            Err(JobValidationError::MissingMedia(ContentKind::Photo))
        ));
    }

    #[test]
    fn test_validate_rejects_blank_text_body() {
        let mut job = BroadcastJob::text_message("   ");
        job.text = Some("   ".to_string());
        assert!(matches!(
            job.validate_for_dispatch(5),
            Err(JobValidationError::EmptyText)
        ));
    }

    #[test]
    fn test_video_note_allows_empty_text() {
        let mut job = BroadcastJob::text_message("");
        job.content_kind = ContentKind::VideoNote;
        job.text = None;
        job.media = Some("file_id_123".to_string());
        assert!(job.validate_for_dispatch(2).is_ok());
    }

    #[test]
    fn test_buttons_json_round_trip() {
        // Buttons are stored as a JSON column, same shape the admin panel emits.
        let buttons = vec![
            InlineButton {
                label: "Open".to_string(),
                target: ButtonTarget::Url("https://example.com".to_string()),
            },
            InlineButton {
                label: "Play".to_string(),
                target: ButtonTarget::WebApp("https://game.example.com".to_string()),
            },
        ];
        let json = serde_json::to_string(&buttons).unwrap();
        let parsed: Vec<InlineButton> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, buttons);
    }
}
