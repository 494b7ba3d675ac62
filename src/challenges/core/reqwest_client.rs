//! `reqwest` transport for browser sessions.

use async_trait::async_trait;
use reqwest::Client;

use super::{BufferedRequest, ChallengeHttpClient, ChallengeHttpClientError, ChallengeHttpResponse};

/// Sends requests through one shared `reqwest::Client`, so cookies set by a
/// challenge answer are seen by every later request of the session.
#[derive(Clone)]
pub struct ReqwestChallengeHttpClient {
    client: Client,
}

impl ReqwestChallengeHttpClient {
    /// `client` must have redirects disabled.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChallengeHttpClient for ReqwestChallengeHttpClient {
    async fn execute(
        &self,
        request: &BufferedRequest,
    ) -> Result<ChallengeHttpResponse, ChallengeHttpClientError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(transport)?;

        log::debug!("{} {} -> {status}", request.method, url);
        Ok(ChallengeHttpResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

fn transport(err: reqwest::Error) -> ChallengeHttpClientError {
    ChallengeHttpClientError::Transport(err.to_string())
}
