//! Telegram Bot API access.
//!
//! Bots talk to Telegram only through [`ChatApi`]; [`TeloxideChatApi`] is the
//! real implementation and tests substitute recording stubs.

use async_trait::async_trait;
use teloxide::Bot;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{
    ChatId, LinkPreviewOptions, MessageId, ParseMode, Recipient, ReplyParameters, Update,
    UpdateKind, UserId,
};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("invalid webhook url: {0}")]
    WebhookUrl(#[from] url::ParseError),
}

/// The parts of an incoming message the bots use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl IncomingMessage {
    /// `None` for updates that are not new messages.
    pub fn from_update(update: &Update) -> Option<Self> {
        let UpdateKind::Message(message) = &update.kind else {
            return None;
        };

        Some(Self {
            chat_id: message.chat.id.0,
            message_id: message.id.0,
            text: message.text().map(str::to_string),
            username: message.chat.username().map(str::to_string),
            first_name: message.chat.first_name().map(str::to_string),
        })
    }

    /// `/start` or `/help`, optionally addressed as `/start@SomeBot`.
    pub fn is_welcome_command(&self) -> bool {
        let Some(text) = self.text.as_deref() else {
            return false;
        };
        let command = text.split_whitespace().next().unwrap_or_default();
        let command = command.split('@').next().unwrap_or_default();
        matches!(command, "/start" | "/help")
    }

    /// Private chats share the user's id.
    pub fn user_id(&self) -> i64 {
        self.chat_id
    }
}

/// How a reply is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Telegram's legacy Markdown.
    Markdown,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Reply to `to`, quoting it, with link previews off. Returns the sent
    /// message id.
    async fn reply(
        &self,
        to: &IncomingMessage,
        text: &str,
        format: TextFormat,
    ) -> Result<i32, ChatApiError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChatApiError>;

    /// Whether `user_id` currently belongs to `channel` (`-100…` id or `@name`).
    async fn is_member(&self, channel: &str, user_id: i64) -> Result<bool, ChatApiError>;

    async fn delete_webhook(&self) -> Result<(), ChatApiError>;

    async fn set_webhook(&self, url: &str) -> Result<(), ChatApiError>;
}

pub struct TeloxideChatApi {
    bot: Bot,
}

impl TeloxideChatApi {
    pub fn new(token: impl Into<String>, api_url: Option<Url>) -> Self {
        let bot = Bot::new(token);
        let bot = match api_url {
            Some(url) => bot.set_api_url(url),
            None => bot,
        };
        Self { bot }
    }
}

#[async_trait]
impl ChatApi for TeloxideChatApi {
    async fn reply(
        &self,
        to: &IncomingMessage,
        text: &str,
        format: TextFormat,
    ) -> Result<i32, ChatApiError> {
        let mut request = self
            .bot
            .send_message(ChatId(to.chat_id), text)
            .reply_parameters(ReplyParameters::new(MessageId(to.message_id)))
            .link_preview_options(LinkPreviewOptions {
                is_disabled: true,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            });
        if format == TextFormat::Markdown {
            #[allow(deprecated)]
            let mode = ParseMode::Markdown;
            request = request.parse_mode(mode);
        }

        let sent = request.await?;
        Ok(sent.id.0)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChatApiError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn is_member(&self, channel: &str, user_id: i64) -> Result<bool, ChatApiError> {
        let member = self
            .bot
            .get_chat_member(channel_recipient(channel), UserId(user_id as u64))
            .await?;
        Ok(member.kind.is_present())
    }

    async fn delete_webhook(&self) -> Result<(), ChatApiError> {
        self.bot.delete_webhook().await?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> Result<(), ChatApiError> {
        self.bot.set_webhook(Url::parse(url)?).await?;
        Ok(())
    }
}

fn channel_recipient(channel: &str) -> Recipient {
    match channel.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(channel.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str) -> Update {
        serde_json::from_str(&serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 42,
                "date": 1700000000,
                "chat": {
                    "id": 555,
                    "type": "private",
                    "username": "itsyourap",
                    "first_name": "Ap"
                },
                "from": {
                    "id": 555,
                    "is_bot": false,
                    "first_name": "Ap",
                    "username": "itsyourap"
                },
                "text": text
            }
        }).to_string())
        .unwrap()
    }

    #[test]
    fn message_fields_are_extracted() {
        let message = IncomingMessage::from_update(&update("hello")).unwrap();
        assert_eq!(message.chat_id, 555);
        assert_eq!(message.message_id, 42);
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.username.as_deref(), Some("itsyourap"));
        assert_eq!(message.first_name.as_deref(), Some("Ap"));
        assert!(!message.is_welcome_command());
    }

    #[test]
    fn welcome_commands_are_recognised() {
        for text in ["/start", "/help", "/start@GpLinksBot", "/help me"] {
            let message = IncomingMessage::from_update(&update(text)).unwrap();
            assert!(message.is_welcome_command(), "{text}");
        }
        let message = IncomingMessage::from_update(&update("/starts")).unwrap();
        assert!(!message.is_welcome_command());
    }

    #[test]
    fn channel_ids_and_usernames_map_to_recipients() {
        assert_eq!(
            channel_recipient("-1001234567890"),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            channel_recipient("@itsyourap_channel"),
            Recipient::ChannelUsername("@itsyourap_channel".into())
        );
    }
}
