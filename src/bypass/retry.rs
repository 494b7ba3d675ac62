use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::{BypassError, LOG_TARGET};

/// Progress of a bypass across attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded(String),
    Failed,
}

impl RetryState {
    /// Advance after attempt `n` produced `result`. An empty result counts as
    /// a failed attempt.
    pub fn advance(self, result: Option<String>, max_attempts: u32) -> RetryState {
        match self {
            RetryState::Attempting(n) => match result.filter(|url| !url.is_empty()) {
                Some(url) => RetryState::Succeeded(url),
                None if n < max_attempts => RetryState::Attempting(n + 1),
                None => RetryState::Failed,
            },
            finished => finished,
        }
    }
}

/// Call `attempt(n)` for `n = 1..=max_attempts` until one returns a
/// non-empty destination.
pub async fn run_with_retries<F, Fut>(
    max_attempts: u32,
    retry_delay: Duration,
    mut attempt: F,
) -> Result<String, BypassError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<String>>,
{
    let max_attempts = max_attempts.max(1);
    let mut state = RetryState::Attempting(1);

    loop {
        match state {
            RetryState::Attempting(n) => {
                if n > 1 && !retry_delay.is_zero() {
                    sleep(retry_delay).await;
                }
                let result = attempt(n).await;
                state = RetryState::Attempting(n).advance(result, max_attempts);
            }
            RetryState::Succeeded(url) => return Ok(url),
            RetryState::Failed => {
                log::warn!(target: LOG_TARGET, "giving up after {max_attempts} attempts");
                return Err(BypassError::ExhaustedRetries {
                    attempts: max_attempts,
                });
            }
        }
    }
}
