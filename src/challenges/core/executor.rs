//! Answering a solved challenge.
//!
//! The answer is posted on the session's own transport so the clearance
//! cookie lands in its jar. A redirect after the answer means the challenge
//! cleared; the request that was interrupted is then sent again at the
//! redirect target.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION, REFERER};
use http::Method;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use super::types::ChallengeSubmission;

/// One request, body fully buffered so it can be sent again.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl BufferedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// `application/x-www-form-urlencoded` body built from `fields`.
    pub fn with_form<'a, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Some(Bytes::from(encoded));
        self
    }
}

/// Buffered response.
#[derive(Debug, Clone)]
pub struct ChallengeHttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl ChallengeHttpResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum ChallengeHttpClientError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Transport shared by normal requests and challenge answers. Redirects must
/// not be followed.
#[async_trait]
pub trait ChallengeHttpClient: Send + Sync {
    async fn execute(
        &self,
        request: &BufferedRequest,
    ) -> Result<ChallengeHttpResponse, ChallengeHttpClientError>;
}

#[derive(Debug, Error)]
pub enum ChallengeExecutionError {
    #[error("failed to convert header '{0}'")]
    InvalidHeader(String),
    #[error("challenge answer was rejected")]
    InvalidAnswer,
    #[error("http client error: {0}")]
    Client(#[from] ChallengeHttpClientError),
}

/// Wait out the challenge delay, post the answer, and replay `interrupted`
/// when the answer is met with a redirect.
pub async fn execute_challenge_submission(
    client: &dyn ChallengeHttpClient,
    submission: ChallengeSubmission,
    interrupted: &BufferedRequest,
) -> Result<ChallengeHttpResponse, ChallengeExecutionError> {
    if !submission.wait.is_zero() {
        sleep(submission.wait).await;
    }

    let answer = BufferedRequest::new(submission.method, submission.url)
        .with_headers(header_map(&submission.headers)?)
        .with_form(
            submission
                .form_fields
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        );
    let answered = client.execute(&answer).await?;

    match answered.status {
        400 => Err(ChallengeExecutionError::InvalidAnswer),
        _ if !answered.is_redirect() => Ok(answered),
        _ => {
            let mut replay = interrupted.clone();
            replay.url = answered
                .location()
                .and_then(|location| answered.url.join(location).ok())
                .unwrap_or_else(|| interrupted.url.clone());
            let referer = HeaderValue::from_str(answered.url.as_str())
                .map_err(|_| ChallengeExecutionError::InvalidHeader(REFERER.to_string()))?;
            replay.headers.insert(REFERER, referer);

            log::debug!("challenge cleared, replaying {} {}", replay.method, replay.url);
            Ok(client.execute(&replay).await?)
        }
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, ChallengeExecutionError> {
    headers
        .iter()
        .map(|(name, value)| -> Result<(HeaderName, HeaderValue), ChallengeExecutionError> {
            let invalid = || ChallengeExecutionError::InvalidHeader(name.clone());
            Ok((
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?,
                HeaderValue::from_str(value).map_err(|_| invalid())?,
            ))
        })
        .collect()
}
