//! Echo bot: replies to every text message with the same text.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use teloxide::types::Update;

use super::{ServiceContext, TelegramBot, admit_sender, install_webhook, welcome_text};
use crate::server::webhook_route;
use crate::telegram::{ChatApi, ChatApiError, IncomingMessage, TextFormat};

pub const LOG_TARGET: &str = "echo_telegram_bot";
pub const ROUTE: &str = "/echo-bot";

const ABOUT: &str = "👌 I can echo your text messages\n\n\
😋 Just send me a text and I will send it back to you\n\n\
🧑🏻‍💻 Created by [@itsyourap](https://t.me/itsyourap)\n\
🔎 Source Code: [Click Here](https://github.com/itsyourap/azure-flask-telegram-bots)";

pub struct EchoBot {
    ctx: Arc<ServiceContext>,
    api: Arc<dyn ChatApi>,
}

impl EchoBot {
    pub fn new(ctx: Arc<ServiceContext>, api: Arc<dyn ChatApi>) -> Self {
        Self { ctx, api }
    }

    async fn process(&self, message: &IncomingMessage) -> Result<(), ChatApiError> {
        let developer = &self.ctx.config.developer;

        if message.is_welcome_command() {
            let text = welcome_text(message, ABOUT, developer);
            self.api.reply(message, &text, TextFormat::Markdown).await?;
            log::info!(target: LOG_TARGET, "Received /start through {message:?}");
            return Ok(());
        }

        if !admit_sender(self.api.as_ref(), message, developer, LOG_TARGET).await? {
            return Ok(());
        }

        let Some(text) = message.text.as_deref() else {
            log::debug!(target: LOG_TARGET, "ignoring non-text message {}", message.message_id);
            return Ok(());
        };

        self.api.reply(message, text, TextFormat::Plain).await?;
        log::info!(target: LOG_TARGET, "Received Message {message:?}");
        Ok(())
    }
}

#[async_trait]
impl TelegramBot for EchoBot {
    fn log_target(&self) -> &'static str {
        LOG_TARGET
    }

    fn route(&self) -> &'static str {
        ROUTE
    }

    fn register_route(self: Arc<Self>, router: Router) -> Router {
        log::debug!(target: LOG_TARGET, "Adding Route {ROUTE}");
        webhook_route(router, self)
    }

    async fn register_webhook(&self) -> Result<(), ChatApiError> {
        let Some(url) = self.ctx.config.server.webhook_url(ROUTE) else {
            return Ok(());
        };
        log::debug!(target: LOG_TARGET, "Registering Webhook at {url}");
        install_webhook(self.api.as_ref(), &url).await
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = IncomingMessage::from_update(&update) else {
            log::debug!(target: LOG_TARGET, "ignoring update {:?}", update.id);
            return;
        };
        if let Err(err) = self.process(&message).await {
            log::error!(target: LOG_TARGET, "failed to answer message {}: {err}", message.message_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::testing::{RecordingApi, Sent, config, message};

    fn bot(pairs: &[(&str, &str)]) -> (EchoBot, Arc<RecordingApi>) {
        let api = Arc::new(RecordingApi::default());
        let ctx = Arc::new(ServiceContext::new(config(pairs)));
        (EchoBot::new(ctx, api.clone()), api)
    }

    #[tokio::test]
    async fn echoes_text_back() {
        let (bot, api) = bot(&[]);
        bot.process(&message("hello there", "anyone")).await.unwrap();
        assert_eq!(
            api.sent(),
            vec![Sent::Reply {
                text: "hello there".into(),
                format: TextFormat::Plain
            }]
        );
    }

    #[tokio::test]
    async fn start_sends_markdown_welcome() {
        let (bot, api) = bot(&[]);
        bot.process(&message("/start", "anyone")).await.unwrap();
        let sent = api.sent();
        assert_eq!(sent.len(), 1);
        let Sent::Reply { text, format } = &sent[0] else {
            panic!("expected a reply");
        };
        assert_eq!(*format, TextFormat::Markdown);
        assert!(text.contains("I can echo your text messages"));
        assert!(!text.contains("Developer Mode"));
    }

    #[tokio::test]
    async fn non_text_messages_are_ignored() {
        let (bot, api) = bot(&[]);
        let mut sticker = message("", "anyone");
        sticker.text = None;
        bot.process(&sticker).await.unwrap();
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn dev_mode_answers_strangers_with_notice_only() {
        let (bot, api) = bot(&[("DEVELOPER_MODE", "true")]);
        bot.process(&message("hello", "stranger")).await.unwrap();
        let sent = api.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Sent::Reply { text, .. } if text.contains("Developer Mode")));
    }
}
