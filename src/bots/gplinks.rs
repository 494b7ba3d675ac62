//! gplinks.co bypass bot.
//!
//! Owner gate, then the optional channel gate, then the bypass itself. A
//! "Processing..." reply is shown while the bypass runs and deleted before
//! the outcome is sent.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use teloxide::types::Update;

use super::{ServiceContext, TelegramBot, admit_sender, install_webhook, welcome_text};
use crate::bypass::GpLinksClient;
use crate::server::webhook_route;
use crate::telegram::{ChatApi, ChatApiError, IncomingMessage, TextFormat};

pub use crate::bypass::LOG_TARGET;
pub const ROUTE: &str = "/gp-link-bypass";

const ABOUT: &str = "👌 I can bypass gplinks.co URLs in few seconds\n\n\
😋 Just send me an URL in https://gplinks.co/xxx format\n\n\
🧑🏻‍💻 Created by [@itsyourap](https://t.me/itsyourap)\n\
🔎 GitHub: [Click Here](https://github.com/itsyourap)\n\
🎁 Donate: UPI - `itsyourap@oksbi`";

const PROCESSING: &str = "Processing... Please Wait";

/// Decides whether a user may use the bot.
#[async_trait]
pub trait MembershipCheck: Send + Sync {
    async fn is_member(&self, user_id: i64) -> bool;
}

/// Membership of a Telegram channel the bot administers. Lookup failures
/// count as "not a member".
pub struct ChannelMembership {
    api: Arc<dyn ChatApi>,
    channel: String,
}

impl ChannelMembership {
    pub fn new(api: Arc<dyn ChatApi>, channel: impl Into<String>) -> Self {
        Self {
            api,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl MembershipCheck for ChannelMembership {
    async fn is_member(&self, user_id: i64) -> bool {
        match self.api.is_member(&self.channel, user_id).await {
            Ok(member) => member,
            Err(err) => {
                log::debug!(target: LOG_TARGET, "membership lookup for {user_id} failed: {err}");
                false
            }
        }
    }
}

pub struct GpLinksBot {
    ctx: Arc<ServiceContext>,
    api: Arc<dyn ChatApi>,
    client: Arc<GpLinksClient>,
    membership: Option<Arc<dyn MembershipCheck>>,
}

impl GpLinksBot {
    pub fn new(
        ctx: Arc<ServiceContext>,
        api: Arc<dyn ChatApi>,
        client: Arc<GpLinksClient>,
        membership: Option<Arc<dyn MembershipCheck>>,
    ) -> Self {
        Self {
            ctx,
            api,
            client,
            membership,
        }
    }

    /// `**Join [this channel](link) to use this bot**` plus the bare link,
    /// underscores escaped for Markdown.
    fn join_channel_text(&self) -> Option<String> {
        let channel = self.ctx.config.developer.channel.as_ref()?;
        Some(format!(
            "**Join [this channel]({}) to use this bot**\n{}",
            channel.link,
            channel.link.replace('_', "\\_")
        ))
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

        if let Some(membership) = &self.membership
            && !membership.is_member(message.user_id()).await
        {
            if let Some(join) = self.join_channel_text() {
                self.api.reply(message, &join, TextFormat::Markdown).await?;
            }
            log::info!(target: LOG_TARGET, "Received Message from unsubscribed user {message:?}");
            return Ok(());
        }

        let processing = self.api.reply(message, PROCESSING, TextFormat::Plain).await?;

        let outcome = match self.client.bypass(text).await {
            Ok(destination) => destination,
            Err(err) => err.reply_text(),
        };

        if let Err(err) = self.api.delete_message(message.chat_id, processing).await {
            log::warn!(target: LOG_TARGET, "could not delete processing message: {err}");
        }
        self.api.reply(message, &outcome, TextFormat::Plain).await?;

        log::info!(target: LOG_TARGET, "Received Message {message:?} bypassed_url={outcome:?}");
        Ok(())
    }
}

#[async_trait]
impl TelegramBot for GpLinksBot {
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
    use crate::bypass::{ProviderSession, SessionError, SessionFactory};

    struct Offline;

    impl SessionFactory for Offline {
        fn open(&self) -> Result<Box<dyn ProviderSession>, SessionError> {
            Err(SessionError::Transport("offline".into()))
        }
    }

    fn make_bot(pairs: &[(&str, &str)], members: Vec<i64>) -> (GpLinksBot, Arc<RecordingApi>) {
        let api = Arc::new(RecordingApi {
            members,
            ..Default::default()
        });
        let ctx = Arc::new(ServiceContext::new(config(pairs)));
        let membership = ctx.config.developer.channel.as_ref().map(|channel| {
            Arc::new(ChannelMembership::new(api.clone(), channel.id.clone()))
                as Arc<dyn MembershipCheck>
        });
        let client = Arc::new(GpLinksClient::new(Arc::new(Offline)));
        (GpLinksBot::new(ctx, api.clone(), client, membership), api)
    }

    fn reply(text: &str) -> Sent {
        Sent::Reply {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }

    #[tokio::test]
    async fn malformed_url_reply_replaces_processing_message() {
        let (bot, api) = make_bot(&[], vec![]);
        bot.process(&message("not a url", "anyone")).await.unwrap();
        assert_eq!(
            api.sent(),
            vec![
                reply(PROCESSING),
                Sent::Delete { message_id: 1001 },
                reply("Malformed URL"),
            ]
        );
    }

    #[tokio::test]
    async fn wrong_host_gets_format_hint() {
        let (bot, api) = make_bot(&[], vec![]);
        bot.process(&message("https://example.com/abc", "anyone"))
            .await
            .unwrap();
        assert_eq!(
            api.sent().last(),
            Some(&reply(
                "Invalid URL\nPlease send your URL in https://gplinks.co/xxx format"
            ))
        );
    }

    #[tokio::test]
    async fn exhausted_retries_reply_error() {
        let (bot, api) = make_bot(&[], vec![]);
        bot.process(&message("https://gplinks.co/xyz", "anyone"))
            .await
            .unwrap();
        assert_eq!(api.sent().last(), Some(&reply("Error")));
    }

    #[tokio::test]
    async fn unsubscribed_users_are_asked_to_join() {
        let channel = [
            ("DEVELOPER_TELEGRAM_CHANNEL_ID", "@itsyourap_channel"),
            ("DEVELOPER_TELEGRAM_CHANNEL_LINK", "https://t.me/itsyourap_channel"),
        ];
        let (bot, api) = make_bot(&channel, vec![]);
        bot.process(&message("https://gplinks.co/xyz", "anyone"))
            .await
            .unwrap();
        assert_eq!(
            api.sent(),
            vec![Sent::Reply {
                text: "**Join [this channel](https://t.me/itsyourap_channel) to use this bot**\nhttps://t.me/itsyourap\\_channel".into(),
                format: TextFormat::Markdown,
            }]
        );

        let (bot, api) = make_bot(&channel, vec![555]);
        bot.process(&message("not a url", "anyone")).await.unwrap();
        assert_eq!(api.sent().last(), Some(&reply("Malformed URL")));
    }
}
