use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, WebAppInfo,
};
use url::Url;

use crate::broadcast::job::{ButtonTarget, ContentKind, InlineButton};
use crate::broadcast::transport::{BroadcastTransport, SendError};

/// Bot API implementation of the broadcast transport. Does raw sends only;
/// the dispatcher owns rate limiting and failure accounting.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard(buttons: &[InlineButton]) -> Result<Option<InlineKeyboardMarkup>, SendError> {
    if buttons.is_empty() {
        return Ok(None);
    }
    let mut row = Vec::with_capacity(buttons.len());
    for button in buttons {
        let parsed = |raw: &str| {
            Url::parse(raw).map_err(|e| SendError::Rejected(format!("bad button url '{raw}': {e}")))
        };
        row.push(match &button.target {
            ButtonTarget::Url(raw) => InlineKeyboardButton::url(button.label.clone(), parsed(raw)?),
            ButtonTarget::WebApp(raw) => InlineKeyboardButton::web_app(
                button.label.clone(),
                WebAppInfo { url: parsed(raw)? },
            ),
        });
    }
    // All controls go on a single row.
    Ok(Some(InlineKeyboardMarkup::new(vec![row])))
}

fn is_http_url(media: &str) -> bool {
    matches!(Url::parse(media), Ok(url) if url.scheme() == "http" || url.scheme() == "https")
}

/// Media references are either a fetchable URL or an opaque file id
/// obtained from a previous upload.
fn input_file(media: &str) -> InputFile {
    if is_http_url(media) {
        match Url::parse(media) {
            Ok(url) => InputFile::url(url),
            Err(_) => InputFile::file_id(FileId(media.to_string())),
        }
    } else {
        InputFile::file_id(FileId(media.to_string()))
    }
}

fn classify(recipient: i64, err: teloxide::RequestError) -> SendError {
    use teloxide::{ApiError, RequestError};
    match err {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked | ApiError::UserDeactivated | ApiError::ChatNotFound => {
                SendError::Unreachable(recipient, api.to_string())
            }
            other => SendError::Rejected(other.to_string()),
        },
        RequestError::Network(e) => SendError::Network(e.to_string()),
        RequestError::RetryAfter(secs) => SendError::Network(format!("flood wait {:?}", secs)),
        other => SendError::Network(other.to_string()),
    }
}

#[async_trait]
impl BroadcastTransport for TelegramTransport {
    async fn send_text(
        &self,
        recipient: i64,
        text: &str,
        buttons: &[InlineButton],
    ) -> Result<(), SendError> {
        let mut request = self
            .bot
            .send_message(ChatId(recipient), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard(buttons)? {
            request = request.reply_markup(kb);
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| classify(recipient, e))
    }

    async fn send_media(
        &self,
        recipient: i64,
        kind: ContentKind,
        media: &str,
        caption: Option<&str>,
        buttons: &[InlineButton],
    ) -> Result<(), SendError> {
        let kb = keyboard(buttons)?;
        match kind {
            ContentKind::Photo => {
                let mut request = self
                    .bot
                    .send_photo(ChatId(recipient), input_file(media))
                    .parse_mode(ParseMode::Html);
                if let Some(caption) = caption {
                    request = request.caption(caption.to_string());
                }
                if let Some(kb) = kb {
                    request = request.reply_markup(kb);
                }
                request
                    .await
                    .map(|_| ())
                    .map_err(|e| classify(recipient, e))
            }
            ContentKind::Video => {
                let mut request = self
                    .bot
                    .send_video(ChatId(recipient), input_file(media))
                    .parse_mode(ParseMode::Html);
                if let Some(caption) = caption {
                    request = request.caption(caption.to_string());
                }
                if let Some(kb) = kb {
                    request = request.reply_markup(kb);
                }
                request
                    .await
                    .map(|_| ())
                    .map_err(|e| classify(recipient, e))
            }
            other => Err(SendError::Rejected(format!(
                "'{}' is not a captioned media kind",
                other.as_str()
            ))),
        }
    }

    async fn send_media_note(&self, recipient: i64, media: &str) -> Result<(), SendError> {
        self.bot
            .send_video_note(ChatId(recipient), input_file(media))
            .await
            .map(|_| ())
            .map_err(|e| classify(recipient, e))
    }
}
