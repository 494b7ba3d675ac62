use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::fields::extract_go_link_fields;
use super::retry::run_with_retries;
use super::session::{ProviderSession, SessionError, SessionFactory, visitor_id_from_location};
use super::validator::validate;
use super::{BypassError, LOG_TARGET};

const DEFAULT_TRACKING_URL: &str = "https://gplinks.in";
const DEFAULT_RESOLVE_URL: &str = "https://gplinks.co";
const MIN_COOLDOWN: Duration = Duration::from_secs(1);

/// Base URLs of the two provider hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub tracking_base: String,
    pub resolve_base: String,
}

impl ProviderEndpoints {
    pub fn new(tracking_base: impl Into<String>, resolve_base: impl Into<String>) -> Self {
        Self {
            tracking_base: tracking_base.into(),
            resolve_base: resolve_base.into(),
        }
    }

    pub fn tracking_url(&self) -> String {
        format!("{}/track/data.php", self.tracking_base.trim_end_matches('/'))
    }

    pub fn resolve_url(&self) -> String {
        format!("{}/links/go", self.resolve_base.trim_end_matches('/'))
    }
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKING_URL, DEFAULT_RESOLVE_URL)
    }
}

/// How one attempt ended.
#[derive(Debug)]
enum AttemptOutcome {
    Resolved(String),
    /// Well-formed answer whose `url` was null, missing or empty.
    NoLink,
}

pub struct GpLinksClient {
    sessions: Arc<dyn SessionFactory>,
    endpoints: ProviderEndpoints,
    cooldown: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GpLinksClient {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            sessions,
            endpoints: ProviderEndpoints::default(),
            cooldown: MIN_COOLDOWN,
            max_attempts: 10,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Wait before the final POST. Values under one second are raised to it.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown.max(MIN_COOLDOWN);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Fixed pause between attempts. Zero disables it.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Resolve the destination behind `text`.
    pub async fn bypass(&self, text: &str) -> Result<String, BypassError> {
        validate(text)?;
        log::info!(target: LOG_TARGET, "bypassing {text}");

        run_with_retries(self.max_attempts, self.retry_delay, |attempt| {
            self.attempt(text, attempt)
        })
        .await
    }

    /// One full pass over the ad gate. `None` means try again.
    pub async fn attempt(&self, url: &str, attempt: u32) -> Option<String> {
        match self.run_attempt(url).await {
            Ok(AttemptOutcome::Resolved(destination)) => {
                log::info!(target: LOG_TARGET, "attempt {attempt}: {url} -> {destination}");
                Some(destination)
            }
            Ok(AttemptOutcome::NoLink) => {
                log::warn!(target: LOG_TARGET, "attempt {attempt}: provider returned no link for {url}");
                None
            }
            Err(err) => {
                log::warn!(target: LOG_TARGET, "attempt {attempt}: {url} failed: {err}");
                None
            }
        }
    }

    async fn run_attempt(&self, url: &str) -> Result<AttemptOutcome, SessionError> {
        let session = self.sessions.open()?;

        let landing = session.get(url).await?;
        let location = landing
            .location
            .as_deref()
            .ok_or(SessionError::MissingLocation)?;
        let vid = visitor_id_from_location(location)?;
        log::debug!(target: LOG_TARGET, "visitor id {vid} for {url}");

        self.simulate_visit(session.as_ref(), &vid).await?;

        let page = session.get(&format!("{url}/?vid={vid}")).await?;
        let fields = extract_go_link_fields(&page.body);
        log::debug!(target: LOG_TARGET, "collected {} go-link fields", fields.len());

        sleep(self.cooldown).await;

        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let answer = session
            .post_form(
                &self.endpoints.resolve_url(),
                &pairs,
                &[("x-requested-with", "XMLHttpRequest")],
            )
            .await?;

        let json: serde_json::Value = serde_json::from_str(&answer.body)?;
        Ok(match json.get("url").and_then(serde_json::Value::as_str) {
            Some(destination) if !destination.is_empty() => {
                AttemptOutcome::Resolved(destination.to_string())
            }
            _ => AttemptOutcome::NoLink,
        })
    }

    /// Two impressions, then a completed visit.
    async fn simulate_visit(
        &self,
        session: &dyn ProviderSession,
        vid: &str,
    ) -> Result<(), SessionError> {
        let tracking = self.endpoints.tracking_url();
        for _ in 0..2 {
            session
                .post_form(&tracking, &[("request", "addVisitorImps"), ("vid", vid)], &[])
                .await?;
        }
        session
            .post_form(
                &tracking,
                &[("request", "setVisitor"), ("vid", vid), ("status", "3")],
                &[],
            )
            .await?;
        Ok(())
    }
}
