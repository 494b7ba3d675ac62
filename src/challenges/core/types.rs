use std::time::Duration;

use http::{HeaderMap, Method};
use url::Url;

/// Borrowed view over a response the browser session received.
#[derive(Debug, Clone)]
pub struct ChallengeResponse<'a> {
    pub url: &'a Url,
    pub status: u16,
    pub headers: &'a HeaderMap,
    pub body: &'a str,
}

/// Answer form for a solved challenge, in page order.
#[derive(Debug, Clone)]
pub struct ChallengeSubmission {
    pub method: Method,
    pub url: Url,
    pub form_fields: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Delay the challenge page asks for before the answer is accepted.
    pub wait: Duration,
}

impl ChallengeSubmission {
    /// Immediate POST of `form_fields` to `url`.
    pub fn post(url: Url, form_fields: Vec<(String, String)>) -> Self {
        Self {
            method: Method::POST,
            url,
            form_fields,
            headers: Vec::new(),
            wait: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Last value posted under `name`.
    pub fn field(&self, name: &str) -> Option<&str> {
        lookup(&self.form_fields, name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
