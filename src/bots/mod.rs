//! Telegram bots served by this process.
//!
//! Each bot owns one webhook route and one Telegram token. Startup builds
//! the enabled bots from [`registry`], mounts their routes and registers
//! their webhooks with Telegram.

pub mod echo;
pub mod gplinks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use teloxide::types::Update;
use tokio::time::sleep;

use crate::bypass::{GpLinksClient, ScraperSessionFactory};
use crate::config::{AppConfig, DeveloperConfig};
use crate::telegram::{ChatApi, ChatApiError, IncomingMessage, TeloxideChatApi, TextFormat};

pub use echo::EchoBot;
pub use gplinks::{ChannelMembership, GpLinksBot, MembershipCheck};

/// Process-wide, read-only state built once at startup.
pub struct ServiceContext {
    pub config: Arc<AppConfig>,
}

impl ServiceContext {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Bypass client wired to the configured endpoints and limits.
    pub fn bypass_client(&self) -> GpLinksClient {
        let bypass = &self.config.bypass;
        let sessions = ScraperSessionFactory::new(bypass.http_timeout)
            .with_rate_limit_max_wait(bypass.rate_limit_max_wait);
        GpLinksClient::new(Arc::new(sessions))
            .with_endpoints(bypass.endpoints.clone())
            .with_cooldown(bypass.cooldown)
            .with_max_attempts(bypass.max_attempts)
            .with_retry_delay(bypass.retry_delay)
    }

    fn chat_api(&self, token: &str) -> Arc<dyn ChatApi> {
        Arc::new(TeloxideChatApi::new(
            token,
            self.config.telegram_api_url.clone(),
        ))
    }
}

#[async_trait]
pub trait TelegramBot: Send + Sync {
    /// Log target, also the name of the bot's log directory.
    fn log_target(&self) -> &'static str;

    /// Webhook path, starting with `/`.
    fn route(&self) -> &'static str;

    /// Mount this bot's webhook endpoint.
    fn register_route(self: Arc<Self>, router: Router) -> Router;

    /// Point Telegram at this bot's webhook URL.
    async fn register_webhook(&self) -> Result<(), ChatApiError>;

    /// Handle one delivered update. Failures are logged, never returned.
    async fn handle_update(&self, update: Update);
}

/// Enabled bots in startup order. In developer mode only the first is kept.
pub fn registry(ctx: &Arc<ServiceContext>) -> Vec<Arc<dyn TelegramBot>> {
    let tokens = &ctx.config.tokens;
    let mut candidates: Vec<(&'static str, Option<&String>)> = vec![
        (echo::LOG_TARGET, tokens.echo.as_ref()),
        (gplinks::LOG_TARGET, tokens.gplinks.as_ref()),
    ];
    if ctx.config.developer.mode {
        candidates.truncate(1);
    }

    let mut bots: Vec<Arc<dyn TelegramBot>> = Vec::new();
    for (target, token) in candidates {
        let Some(token) = token else {
            log::warn!(target: target, "no bot token configured, {target} disabled");
            continue;
        };
        let api = ctx.chat_api(token);
        if target == echo::LOG_TARGET {
            bots.push(Arc::new(EchoBot::new(ctx.clone(), api)));
        } else {
            let membership = ctx.config.developer.channel.as_ref().map(|channel| {
                Arc::new(ChannelMembership::new(api.clone(), channel.id.clone()))
                    as Arc<dyn MembershipCheck>
            });
            bots.push(Arc::new(GpLinksBot::new(
                ctx.clone(),
                api,
                Arc::new(ctx.bypass_client()),
                membership,
            )));
        }
    }
    bots
}

/// Drop any existing webhook, pause briefly, then set the new one.
pub async fn install_webhook(api: &dyn ChatApi, url: &str) -> Result<(), ChatApiError> {
    api.delete_webhook().await?;
    sleep(Duration::from_millis(100)).await;
    api.set_webhook(url).await
}

pub(crate) fn developer_notice(developer: &DeveloperConfig) -> String {
    format!(
        "⚙️ Currently I am in Developer Mode\n🫡 I will only respond to [@{}]({})",
        developer.name, developer.telegram_link
    )
}

/// Greeting, bot description, and the dev-mode notice when enabled.
pub(crate) fn welcome_text(message: &IncomingMessage, body: &str, developer: &DeveloperConfig) -> String {
    let mut text = format!(
        "😃 **Hi [{}](https://t.me/{}),**\n\n{body}",
        message.first_name.as_deref().unwrap_or_default(),
        message.username.as_deref().unwrap_or_default(),
    );
    if developer.mode {
        text.push_str("\n\n");
        text.push_str(&developer_notice(developer));
    }
    text
}

/// In developer mode, turn away everyone but the owner. Returns `true` when
/// the message should be processed.
pub(crate) async fn admit_sender(
    api: &dyn ChatApi,
    message: &IncomingMessage,
    developer: &DeveloperConfig,
    target: &'static str,
) -> Result<bool, ChatApiError> {
    if !developer.mode || message.username.as_deref() == Some(developer.name.as_str()) {
        return Ok(true);
    }

    api.reply(message, &developer_notice(developer), TextFormat::Plain)
        .await?;
    log::info!(target: target, "Received Message From Non-Dev {message:?}");
    Ok(false)
}
