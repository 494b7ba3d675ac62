//! # webhook-bots
//!
//! Telegram bots hosted behind one webhook server:
//!
//! - an echo bot that sends every text message back;
//! - a gplinks.co bypass bot that resolves a short link to its destination
//!   by walking the provider's ad gate with a Cloudflare-aware browser
//!   session.
//!
//! The bypass client can be used on its own:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use webhook_bots::{GpLinksClient, ScraperSessionFactory};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sessions = ScraperSessionFactory::new(Duration::from_secs(30));
//!     let client = GpLinksClient::new(Arc::new(sessions));
//!     match client.bypass("https://gplinks.co/xyz").await {
//!         Ok(url) => println!("{url}"),
//!         Err(err) => println!("{}", err.reply_text()),
//!     }
//! }
//! ```

mod browser;

pub mod bots;
pub mod bypass;
pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod logging;
pub mod server;
pub mod telegram;

pub use crate::browser::{
    BrowserSession, BrowserSessionBuilder, BrowserSessionConfig, ScraperError, ScraperResponse,
    ScraperResult,
};

pub use crate::bots::{EchoBot, GpLinksBot, ServiceContext, TelegramBot, registry};

pub use crate::bypass::{
    BypassError, GpLinksClient, ProviderEndpoints, ProviderResponse, ProviderSession,
    ScraperSessionFactory, SessionError, SessionFactory,
};

pub use crate::challenges::core::{
    BufferedRequest, ChallengeExecutionError, ChallengeHttpClient, ChallengeHttpClientError,
    ChallengeHttpResponse, ChallengeResponse, ChallengeSubmission, ReqwestChallengeHttpClient,
    execute_challenge_submission,
};

pub use crate::challenges::detectors::{ChallengeDetection, ChallengeDetector, ChallengeType};

pub use crate::challenges::pipeline::{ChallengePipeline, ChallengePipelineResult, PipelineError};

pub use crate::challenges::solvers::MitigationPlan;

pub use crate::challenges::user_agents::{
    UserAgentError, UserAgentProfile, get_user_agent_profile,
};

pub use crate::config::{AppConfig, ConfigError};

pub use crate::external_deps::interpreters::{
    BoaJavascriptInterpreter, InterpreterError, InterpreterResult, JavascriptInterpreter,
};

pub use crate::telegram::{ChatApi, ChatApiError, IncomingMessage, TeloxideChatApi};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
