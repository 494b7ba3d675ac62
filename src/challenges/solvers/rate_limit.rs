//! Handler for Cloudflare rate limiting responses (error 1015).
//!
//! Picks how long to back off from the `Retry-After` header, the page text,
//! or a random default window, and caps it so a bot reply never hangs for
//! minutes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::RETRY_AFTER;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::challenges::core::{ChallengeResponse, is_cloudflare_response};

use super::MitigationPlan;

const DEFAULT_DELAY_MIN: Duration = Duration::from_secs(5);
const DEFAULT_DELAY_MAX: Duration = Duration::from_secs(15);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Advises backoff windows for 1015 responses.
#[derive(Debug, Clone)]
pub struct RateLimitHandler {
    delay_min: Duration,
    delay_max: Duration,
    max_wait: Duration,
}

impl RateLimitHandler {
    pub fn new() -> Self {
        Self {
            delay_min: DEFAULT_DELAY_MIN,
            delay_max: DEFAULT_DELAY_MAX,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Waits longer than `max_wait` are not worth retrying.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn is_rate_limited(response: &ChallengeResponse<'_>) -> bool {
        is_cloudflare_response(response)
            && matches!(response.status, 429 | 503)
            && RATE_LIMIT_RE.is_match(response.body)
    }

    pub fn plan(&self, response: &ChallengeResponse<'_>) -> Result<MitigationPlan, RateLimitError> {
        if !Self::is_rate_limited(response) {
            return Err(RateLimitError::NotRateLimited);
        }

        let (delay, source) = self.determine_delay(response);
        if delay > self.max_wait {
            log::warn!(
                "rate limited by {} for {:.0}s, not waiting",
                response.url,
                delay.as_secs_f64()
            );
            return Ok(MitigationPlan::no_retry("rate_limit"));
        }

        Ok(MitigationPlan::retry_after(delay, "rate_limit", source))
    }

    fn determine_delay(&self, response: &ChallengeResponse<'_>) -> (Duration, &'static str) {
        if let Some(delay) = retry_after_header(response) {
            return (delay, "header");
        }

        if let Some(delay) = delay_from_body(response.body) {
            return (delay, "body");
        }

        (self.random_delay(), "default")
    }

    fn random_delay(&self) -> Duration {
        if self.delay_max <= self.delay_min {
            return self.delay_min;
        }
        let millis = rand::thread_rng()
            .gen_range(self.delay_min.as_millis() as u64..self.delay_max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

impl Default for RateLimitHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_after_header(response: &ChallengeResponse<'_>) -> Option<Duration> {
    let raw = response.headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<f64>()
        && seconds.is_finite()
        && seconds >= 0.0
    {
        return Duration::try_from_secs_f64(seconds).ok();
    }

    DateTime::parse_from_rfc2822(raw)
        .ok()
        .and_then(|date| (date.with_timezone(&Utc) - Utc::now()).to_std().ok())
}

fn delay_from_body(body: &str) -> Option<Duration> {
    let caps = RATE_LIMIT_DELAY_RE.captures(body)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2)?.as_str().to_lowercase().as_str() {
        "minute" | "minutes" => 60,
        "hour" | "hours" => 3600,
        _ => 1,
    };
    Some(Duration::from_secs(amount.saturating_mul(multiplier)))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("response is not a Cloudflare rate limit page")]
    NotRateLimited,
}

static RATE_LIMIT_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"(<span[^>]*class=['"]cf-error-code['"]>1015<|you are being rate limited)"#)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("invalid rate limit regex")
});

static RATE_LIMIT_DELAY_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"(\d+)\s*(seconds?|minutes?|hours?)"#)
        .case_insensitive(true)
        .build()
        .expect("invalid delay regex")
});

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, header::SERVER};
    use url::Url;

    fn plan_for(body: &str, retry_after: Option<&'static str>) -> Result<MitigationPlan, RateLimitError> {
        plan_with(RateLimitHandler::new(), body, retry_after)
    }

    fn plan_with(
        handler: RateLimitHandler,
        body: &str,
        retry_after: Option<&'static str>,
    ) -> Result<MitigationPlan, RateLimitError> {
        let url = Url::parse("https://gplinks.co/xyz").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SERVER, HeaderValue::from_static("cloudflare"));
        if let Some(value) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        }
        let response = ChallengeResponse {
            url: &url,
            status: 429,
            headers: &headers,
            body,
        };
        handler.plan(&response)
    }

    #[test]
    fn plan_uses_retry_after_header() {
        let plan = plan_for("<span class='cf-error-code'>1015</span>", Some("12")).unwrap();
        assert!(plan.should_retry);
        assert_eq!(plan.wait, Some(Duration::from_secs(12)));
        assert_eq!(plan.delay_source, "header");
    }

    #[test]
    fn plan_reads_delay_from_body() {
        let plan = plan_for("You are being rate limited. Try again in 30 seconds", None).unwrap();
        assert_eq!(plan.wait, Some(Duration::from_secs(30)));
        assert_eq!(plan.delay_source, "body");
    }

    #[test]
    fn long_waits_are_not_retried() {
        let plan = plan_for("You are being rate limited for 10 minutes", None).unwrap();
        assert!(!plan.should_retry);
    }

    #[test]
    fn default_delay_stays_in_range() {
        let plan = plan_for("<span class=\"cf-error-code\">1015</span>", None).unwrap();
        let wait = plan.wait.unwrap();
        assert!(wait >= DEFAULT_DELAY_MIN && wait <= DEFAULT_DELAY_MAX);
        assert_eq!(plan.delay_source, "default");
    }

    #[test]
    fn max_wait_caps_header_delay() {
        let handler = RateLimitHandler::new().with_max_wait(Duration::from_secs(5));
        let plan = plan_with(handler, "You are being rate limited", Some("12")).unwrap();
        assert!(!plan.should_retry);
    }

    #[test]
    fn oversized_retry_after_is_not_waited_out() {
        let plan = plan_for("You are being rate limited", Some("1e30")).unwrap();
        assert!(!plan.should_retry);
        assert_eq!(plan.wait, None);
    }

    #[test]
    fn ordinary_pages_are_rejected() {
        assert!(matches!(
            plan_for("<html>hello</html>", None),
            Err(RateLimitError::NotRateLimited)
        ));
    }
}
