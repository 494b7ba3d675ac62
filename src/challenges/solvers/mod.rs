//! Challenge solver registry.
//!
//! Only the IUAM JavaScript challenge is answered directly; rate limiting is
//! handled by waiting. Everything else is reported as unsupported by the
//! pipeline.

pub mod javascript_v1;
pub mod rate_limit;

use std::time::Duration;

/// What the session should do instead of submitting a form.
#[derive(Debug, Clone, PartialEq)]
pub struct MitigationPlan {
    pub should_retry: bool,
    pub wait: Option<Duration>,
    pub reason: String,
    /// Where the wait came from (`header`, `body` or `default`).
    pub delay_source: &'static str,
}

impl MitigationPlan {
    pub fn retry_after(wait: Duration, reason: impl Into<String>, delay_source: &'static str) -> Self {
        Self {
            should_retry: true,
            wait: Some(wait),
            reason: reason.into(),
            delay_source,
        }
    }

    pub fn no_retry(reason: impl Into<String>) -> Self {
        Self {
            should_retry: false,
            wait: None,
            reason: reason.into(),
            delay_source: "none",
        }
    }
}
