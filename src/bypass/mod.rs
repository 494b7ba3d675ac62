//! gplinks.co bypass client.
//!
//! [`GpLinksClient::bypass`] validates the user's text, then runs up to
//! `max_attempts` independent attempts. Each attempt opens a fresh browser
//! session and walks the provider's ad gate:
//!
//! 1. GET the short link without following redirects, read the visitor id
//!    from `Location`.
//! 2. Report two impressions and a completed visit to the tracking endpoint.
//! 3. GET `<link>/?vid=<vid>` and collect the `#go-link` form inputs.
//! 4. Wait the cooldown and POST the inputs to `/links/go`; the JSON `url`
//!    field is the destination.

mod client;
mod fields;
mod retry;
mod session;
mod validator;

pub use client::{GpLinksClient, ProviderEndpoints};
pub use fields::extract_go_link_fields;
pub use retry::{RetryState, run_with_retries};
pub use session::{
    ProviderResponse, ProviderSession, ScraperSessionFactory, SessionError, SessionFactory,
    visitor_id_from_location,
};
pub use validator::{HOST_MARKER, URL_HINT, validate};

use thiserror::Error;

/// Log target shared with the bypass bot so attempts land in its log file.
pub const LOG_TARGET: &str = "gplinks_bypasser_telegram_bot";

/// Failures shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BypassError {
    #[error("malformed url")]
    MalformedUrl,
    #[error("unsupported host, expected {hint}")]
    UnsupportedHost { hint: String },
    #[error("no destination after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
}

impl BypassError {
    /// Chat reply for this failure.
    pub fn reply_text(&self) -> String {
        match self {
            BypassError::MalformedUrl => "Malformed URL".to_string(),
            BypassError::UnsupportedHost { hint } => {
                format!("Invalid URL\nPlease send your URL in {hint} format")
            }
            BypassError::ExhaustedRetries { .. } => "Error".to_string(),
        }
    }
}
