//! Solver for the Cloudflare IUAM ("I'm Under Attack") JavaScript challenge.
//!
//! Parses the challenge form, runs the page script through the configured
//! interpreter and returns the submission the session must post back.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::challenges::core::{
    ChallengeParseError, ChallengeResponse, ChallengeSubmission, is_cloudflare_response,
    origin_from_url, parse_iuam_challenge,
};
use crate::external_deps::interpreters::{InterpreterError, JavascriptInterpreter};

/// Used when the page does not state its submit delay.
const FALLBACK_DELAY: Duration = Duration::from_secs(4);

pub struct JavascriptV1Solver {
    interpreter: Arc<dyn JavascriptInterpreter>,
}

impl JavascriptV1Solver {
    pub fn new(interpreter: Arc<dyn JavascriptInterpreter>) -> Self {
        Self { interpreter }
    }

    /// Returns `true` if the response resembles a Cloudflare IUAM challenge.
    pub fn is_iuam_challenge(&self, response: &ChallengeResponse<'_>) -> bool {
        is_cloudflare_response(response)
            && matches!(response.status, 429 | 503)
            && response.body.contains("/cdn-cgi/images/trace/jsch/")
            && parse_iuam_challenge(response).is_ok()
    }

    /// Parse the IUAM page and return the ready-to-submit payload.
    pub fn solve(
        &self,
        response: &ChallengeResponse<'_>,
    ) -> Result<ChallengeSubmission, JavascriptV1Error> {
        if !self.is_iuam_challenge(response) {
            return Err(JavascriptV1Error::NotAnIuamChallenge);
        }

        let page_url = response.url;
        let host = page_url.host_str().ok_or(JavascriptV1Error::MissingHost)?;

        let blueprint = parse_iuam_challenge(response)?;
        let answer = self.interpreter.solve_challenge(response.body, host)?;

        let submission = blueprint
            .to_submission(page_url, vec![("jschl_answer".to_string(), answer)])?
            .with_wait(extract_delay(response.body).unwrap_or(FALLBACK_DELAY))
            .with_header("Referer", page_url.as_str())
            .with_header("Origin", origin_from_url(page_url));

        Ok(submission)
    }
}

/// The `setTimeout(..., <ms>)` that submits the form.
fn extract_delay(body: &str) -> Option<Duration> {
    static DELAY_RE: Lazy<Regex> = Lazy::new(|| {
        RegexBuilder::new(r#"submit\(\);\r?\n?\s*\},\s*([0-9]+)"#)
            .case_insensitive(true)
            .build()
            .unwrap()
    });

    DELAY_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[derive(Debug, Error)]
pub enum JavascriptV1Error {
    #[error("response is not an IUAM challenge")]
    NotAnIuamChallenge,
    #[error("unable to determine challenge host")]
    MissingHost,
    #[error("javascript interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),
    #[error("challenge parsing error: {0}")]
    Parse(#[from] ChallengeParseError),
}
