//! Transport seam for bypass attempts.
//!
//! Attempts talk to the provider through [`ProviderSession`] so the flow can
//! be driven by scripted sessions in tests. The production factory hands out
//! a fresh [`BrowserSession`] per attempt.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::{BrowserSession, ScraperError, ScraperResponse};

/// What an attempt needs from a provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl From<ScraperResponse> for ProviderResponse {
    fn from(response: ScraperResponse) -> Self {
        Self {
            status: response.status(),
            location: response.location().map(str::to_string),
            body: response.text(),
        }
    }
}

/// Per-attempt failures. Logged, never shown to the user.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser session: {0}")]
    Scraper(#[from] ScraperError),
    #[error("transport: {0}")]
    Transport(String),
    #[error("redirect carried no Location header")]
    MissingLocation,
    #[error("no visitor id in Location '{0}'")]
    NoVisitorId(String),
    #[error("resolve answer is not json: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Browser-like session owned by a single attempt.
#[async_trait]
pub trait ProviderSession: Send + Sync {
    /// GET without following redirects.
    async fn get(&self, url: &str) -> Result<ProviderResponse, SessionError>;

    /// POST a url-encoded form.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<ProviderResponse, SessionError>;
}

/// Opens one new session per attempt.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn ProviderSession>, SessionError>;
}

#[async_trait]
impl ProviderSession for BrowserSession {
    async fn get(&self, url: &str) -> Result<ProviderResponse, SessionError> {
        Ok(BrowserSession::get(self, url).await?.into())
    }

    async fn post_form(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<ProviderResponse, SessionError> {
        Ok(BrowserSession::post_form(self, url, fields, headers)
            .await?
            .into())
    }
}

/// Builds challenge-aware [`BrowserSession`]s.
#[derive(Debug, Clone)]
pub struct ScraperSessionFactory {
    timeout: Duration,
    max_challenge_attempts: usize,
    rate_limit_max_wait: Option<Duration>,
}

impl ScraperSessionFactory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_challenge_attempts: 3,
            rate_limit_max_wait: None,
        }
    }

    pub fn with_max_challenge_attempts(mut self, attempts: usize) -> Self {
        self.max_challenge_attempts = attempts;
        self
    }

    /// Cap on how long a session sleeps through a Cloudflare rate limit.
    pub fn with_rate_limit_max_wait(mut self, max_wait: Duration) -> Self {
        self.rate_limit_max_wait = Some(max_wait);
        self
    }
}

impl SessionFactory for ScraperSessionFactory {
    fn open(&self) -> Result<Box<dyn ProviderSession>, SessionError> {
        let mut builder = BrowserSession::builder()
            .with_timeout(self.timeout)
            .with_max_challenge_attempts(self.max_challenge_attempts);
        if let Some(max_wait) = self.rate_limit_max_wait {
            builder = builder.with_rate_limit_max_wait(max_wait);
        }
        let session = builder.build()?;
        Ok(Box::new(session))
    }
}

/// The visitor id is whatever follows the last `=` of the redirect target.
pub fn visitor_id_from_location(location: &str) -> Result<String, SessionError> {
    location
        .rsplit_once('=')
        .map(|(_, vid)| vid.to_string())
        .ok_or_else(|| SessionError::NoVisitorId(location.to_string()))
}
