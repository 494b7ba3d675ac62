//! Process configuration.
//!
//! Read once at startup from the environment (a `.env` file is loaded first
//! when present) and shared read-only afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use log::LevelFilter;
use thiserror::Error;
use url::Url;

use crate::bypass::ProviderEndpoints;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("{var} is required when {because} is set")]
    Missing {
        var: &'static str,
        because: &'static str,
    },
}

/// Telegram channel users must join before using the bypass bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// `-100…` chat id or `@username`.
    pub id: String,
    pub link: String,
}

#[derive(Debug, Clone)]
pub struct DeveloperConfig {
    pub mode: bool,
    /// Owner's Telegram username, without `@`.
    pub name: String,
    pub telegram_link: String,
    pub channel: Option<ChannelConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public host webhooks point at; without it no bot is started.
    pub website_hostname: Option<String>,
    pub webhook_port: u16,
    pub bind_address: SocketAddr,
}

impl ServerConfig {
    /// Public webhook URL for `route` (which starts with `/`).
    pub fn webhook_url(&self, route: &str) -> Option<String> {
        self.website_hostname
            .as_ref()
            .map(|host| format!("https://{host}:{}{route}", self.webhook_port))
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub timezone: Tz,
}

#[derive(Debug, Clone, Default)]
pub struct BotTokens {
    pub echo: Option<String>,
    pub gplinks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BypassConfig {
    pub endpoints: ProviderEndpoints,
    pub max_attempts: u32,
    pub cooldown: Duration,
    pub retry_delay: Duration,
    pub http_timeout: Duration,
    /// Longest Cloudflare rate-limit backoff a session sleeps through.
    pub rate_limit_max_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub developer: DeveloperConfig,
    pub server: ServerConfig,
    pub storage_path: PathBuf,
    pub logging: LogConfig,
    pub tokens: BotTokens,
    pub bypass: BypassConfig,
    pub telegram_api_url: Option<Url>,
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let channel = match (
            get("DEVELOPER_TELEGRAM_CHANNEL_ID"),
            get("DEVELOPER_TELEGRAM_CHANNEL_LINK"),
        ) {
            (Some(id), Some(link)) => Some(ChannelConfig { id, link }),
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    var: "DEVELOPER_TELEGRAM_CHANNEL_LINK",
                    because: "DEVELOPER_TELEGRAM_CHANNEL_ID",
                });
            }
            (None, _) => None,
        };

        let developer = DeveloperConfig {
            mode: get("DEVELOPER_MODE").is_some_and(|v| parse_flag(&v)),
            name: get("DEVELOPER_NAME").unwrap_or_else(|| "itsyourap".into()),
            telegram_link: get("DEVELOPER_TELEGRAM")
                .unwrap_or_else(|| "https://t.me/itsyourap".into()),
            channel,
        };

        let server = ServerConfig {
            website_hostname: get("WEBSITE_HOSTNAME"),
            webhook_port: parse_or("WEBHOOK_PORT", get("WEBHOOK_PORT"), 443)?,
            bind_address: parse_or(
                "BIND_ADDRESS",
                get("BIND_ADDRESS"),
                SocketAddr::from(([0, 0, 0, 0], 8000)),
            )?,
        };

        let logging = LogConfig {
            level: parse_or("LOG_LEVEL", get("LOG_LEVEL"), LevelFilter::Debug)?,
            timezone: parse_or("LOG_TIMEZONE", get("LOG_TIMEZONE"), chrono_tz::Asia::Kolkata)?,
        };

        let tokens = BotTokens {
            echo: get("ITSYOURAP_ECHO_TELEGRAM_BOT_TOKEN")
                .or_else(|| get("ITSYOURAP_DEV_TELEGRAM_BOT_TOKEN")),
            gplinks: get("ITSYOURAP_GPLINK_BYPASSER_TELEGRAM_BOT_TOKEN"),
        };

        let defaults = ProviderEndpoints::default();
        let bypass = BypassConfig {
            endpoints: ProviderEndpoints::new(
                get("GPLINKS_TRACKING_URL").unwrap_or(defaults.tracking_base),
                get("GPLINKS_RESOLVE_URL").unwrap_or(defaults.resolve_base),
            ),
            max_attempts: parse_or("BYPASS_MAX_ATTEMPTS", get("BYPASS_MAX_ATTEMPTS"), 10u32)?.max(1),
            cooldown: Duration::from_millis(
                parse_or("BYPASS_COOLDOWN_MS", get("BYPASS_COOLDOWN_MS"), 1000u64)?.max(1000),
            ),
            retry_delay: Duration::from_millis(parse_or(
                "BYPASS_RETRY_DELAY_MS",
                get("BYPASS_RETRY_DELAY_MS"),
                0u64,
            )?),
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                30u64,
            )?),
            rate_limit_max_wait: Duration::from_secs(parse_or(
                "RATE_LIMIT_MAX_WAIT_SECS",
                get("RATE_LIMIT_MAX_WAIT_SECS"),
                60u64,
            )?),
        };

        let telegram_api_url = match get("TELEGRAM_API_URL") {
            Some(raw) => Some(parse_value::<Url>("TELEGRAM_API_URL", raw)?),
            None => None,
        };

        Ok(Self {
            developer,
            server,
            storage_path: PathBuf::from(get("STORAGE_PATH").unwrap_or_else(|| "./files".into())),
            logging,
            tokens,
            bypass,
            telegram_api_url,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage_path.join("logs")
    }
}

/// `true`, `1`, `t`, `y` (any case) enable a flag.
fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "t" | "y")
}

fn parse_or<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => parse_value(var, value),
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Invalid { var, value }),
    }
}
