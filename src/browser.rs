//! Browser-like HTTP session.
//!
//! Wraps one `reqwest::Client` (cookie jar, browser headers, no automatic
//! redirects) and runs every response through the challenge pipeline so
//! callers only see the page behind a Cloudflare interstitial.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::LOCATION;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use crate::challenges::core::{
	BufferedRequest, ChallengeExecutionError, ChallengeHttpClient, ChallengeHttpClientError,
	ChallengeHttpResponse, ChallengeResponse, ReqwestChallengeHttpClient,
	execute_challenge_submission,
};
use crate::challenges::detectors::ChallengeType;
use crate::challenges::pipeline::{ChallengePipeline, ChallengePipelineResult, PipelineError};
use crate::challenges::solvers::{
	MitigationPlan, javascript_v1::JavascriptV1Solver, rate_limit::RateLimitHandler,
};
use crate::challenges::user_agents::{UserAgentError, get_user_agent_profile};
use crate::external_deps::interpreters::BoaJavascriptInterpreter;

pub type ScraperResult<T> = Result<T, ScraperError>;

#[derive(Debug, Error)]
pub enum ScraperError {
	#[error("http client setup failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("{0}")]
	Transport(#[from] ChallengeHttpClientError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("user-agent initialisation failed: {0}")]
	UserAgent(#[from] UserAgentError),
	#[error("header conversion failed: {0}")]
	InvalidHeader(String),
	#[error("challenge execution failed: {0}")]
	ChallengeExecution(#[from] ChallengeExecutionError),
	#[error("challenge pipeline error: {0}")]
	Pipeline(#[from] PipelineError),
	#[error("unsupported challenge: {0}")]
	Unsupported(ChallengeType),
	#[error("gave up after mitigation: {}", .0.reason)]
	Mitigation(Box<MitigationPlan>),
	#[error("still challenged after {0} attempts")]
	ChallengeLimit(usize),
	#[error("invalid json body: {0}")]
	Json(#[from] serde_json::Error),
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ScraperResponse {
	status: u16,
	headers: HeaderMap,
	body: Bytes,
	url: Url,
}

impl ScraperResponse {
	pub fn new(status: u16, headers: HeaderMap, body: Bytes, url: Url) -> Self {
		Self {
			status,
			headers,
			body,
			url,
		}
	}

	pub fn status(&self) -> u16 {
		self.status
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Raw `Location` header; `None` when absent or not visible ASCII.
	pub fn location(&self) -> Option<&str> {
		self.headers
			.get(LOCATION)
			.and_then(|value| value.to_str().ok())
	}

	/// Body decoded as UTF-8, invalid sequences replaced.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	pub fn json<T: DeserializeOwned>(&self) -> ScraperResult<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}
}

impl From<ChallengeHttpResponse> for ScraperResponse {
	fn from(response: ChallengeHttpResponse) -> Self {
		Self::new(response.status, response.headers, response.body, response.url)
	}
}

/// Session configuration used by the builder.
#[derive(Clone)]
pub struct BrowserSessionConfig {
	pub max_challenge_attempts: usize,
	pub timeout: Duration,
	pub rate_limit: RateLimitHandler,
}

impl Default for BrowserSessionConfig {
	fn default() -> Self {
		Self {
			max_challenge_attempts: 3,
			timeout: Duration::from_secs(30),
			rate_limit: RateLimitHandler::new(),
		}
	}
}

#[derive(Default)]
pub struct BrowserSessionBuilder {
	config: BrowserSessionConfig,
}

impl BrowserSessionBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_max_challenge_attempts(mut self, attempts: usize) -> Self {
		self.config.max_challenge_attempts = attempts;
		self
	}

	/// Per-request timeout, applied to every outbound call of the session.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.config.timeout = timeout;
		self
	}

	/// Longest rate-limit backoff the session will sleep through.
	pub fn with_rate_limit_max_wait(mut self, max_wait: Duration) -> Self {
		self.config.rate_limit = self.config.rate_limit.with_max_wait(max_wait);
		self
	}

	pub fn build(self) -> ScraperResult<BrowserSession> {
		BrowserSession::with_config(self.config)
	}
}

/// One browser identity with its own cookie jar.
pub struct BrowserSession {
	config: BrowserSessionConfig,
	transport: ReqwestChallengeHttpClient,
	pipeline: ChallengePipeline,
}

impl BrowserSession {
	pub fn builder() -> BrowserSessionBuilder {
		BrowserSessionBuilder::new()
	}

	fn with_config(config: BrowserSessionConfig) -> ScraperResult<Self> {
		let profile = get_user_agent_profile()?;
		let base_headers = to_header_map(&profile.headers)?;

		let client = reqwest::Client::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.default_headers(base_headers)
			.timeout(config.timeout)
			.build()?;

		let pipeline = ChallengePipeline::default()
			.with_javascript_v1(JavascriptV1Solver::new(Arc::new(BoaJavascriptInterpreter::new())))
			.with_rate_limit(config.rate_limit.clone());

		log::debug!(
			"browser session ready ({} profile, timeout {:?})",
			profile.browser,
			config.timeout
		);

		Ok(Self {
			transport: ReqwestChallengeHttpClient::from_client(client),
			pipeline,
			config,
		})
	}

	/// GET without following redirects.
	pub async fn get(&self, url: &str) -> ScraperResult<ScraperResponse> {
		let url = Url::parse(url)?;
		self.request(BufferedRequest::new(Method::GET, url)).await
	}

	/// POST `fields` as `application/x-www-form-urlencoded`.
	pub async fn post_form(
		&self,
		url: &str,
		fields: &[(&str, &str)],
		extra_headers: &[(&str, &str)],
	) -> ScraperResult<ScraperResponse> {
		let url = Url::parse(url)?;
		let mut request = BufferedRequest::new(Method::POST, url).with_form(fields.iter().copied());
		for (name, value) in extra_headers {
			let (name, value) = to_header_pair(name, value)?;
			request.headers.insert(name, value);
		}

		self.request(request).await
	}

	/// Send a request, answering any challenges in between.
	pub async fn request(&self, request: BufferedRequest) -> ScraperResult<ScraperResponse> {
		let mut challenges = 0usize;
		let mut replayed: Option<ScraperResponse> = None;

		loop {
			let response = match replayed.take() {
				Some(response) => response,
				None => self.transport.execute(&request).await?.into(),
			};

			let body_text = response.text();
			let challenge_response = ChallengeResponse {
				url: response.url(),
				status: response.status(),
				headers: response.headers(),
				body: &body_text,
			};

			let result = self.pipeline.evaluate(&challenge_response);
			if matches!(result, ChallengePipelineResult::NoChallenge) {
				return Ok(response);
			}

			challenges += 1;
			if challenges > self.config.max_challenge_attempts {
				return Err(ScraperError::ChallengeLimit(self.config.max_challenge_attempts));
			}

			match result {
				ChallengePipelineResult::NoChallenge => return Ok(response),
				ChallengePipelineResult::Submission {
					detection,
					submission,
				} => {
					log::info!(
						"answering {} challenge on {} (confidence {:.2})",
						detection.challenge_type,
						detection.url,
						detection.confidence
					);
					let answered =
						execute_challenge_submission(&self.transport, submission, &request).await?;
					replayed = Some(answered.into());
				}
				ChallengePipelineResult::Mitigation { detection, plan } => {
					if !plan.should_retry {
						return Err(ScraperError::Mitigation(Box::new(plan)));
					}
					let wait = plan.wait.unwrap_or_default();
					log::warn!(
						"{} on {}, retrying in {:.1}s ({} delay)",
						detection.challenge_type,
						detection.url,
						wait.as_secs_f64(),
						plan.delay_source
					);
					sleep(wait).await;
				}
				ChallengePipelineResult::Unsupported { detection } => {
					log::warn!(
						"unsupported {} challenge on {} (pattern {})",
						detection.challenge_type,
						detection.url,
						detection.pattern_id
					);
					return Err(ScraperError::Unsupported(detection.challenge_type));
				}
				ChallengePipelineResult::Failed { detection, error } => {
					log::warn!("{} solver failed on {}: {}", detection.challenge_type, detection.url, error);
					return Err(ScraperError::Pipeline(error));
				}
			}
		}
	}
}

fn to_header_map(headers: &HashMap<String, String>) -> ScraperResult<HeaderMap> {
	let mut map = HeaderMap::new();
	for (name, value) in headers {
		let (name, value) = to_header_pair(name, value)?;
		map.insert(name, value);
	}
	Ok(map)
}

fn to_header_pair(name: &str, value: &str) -> ScraperResult<(HeaderName, HeaderValue)> {
	let header_name = HeaderName::from_bytes(name.as_bytes())
		.map_err(|_| ScraperError::InvalidHeader(name.to_string()))?;
	let header_value =
		HeaderValue::from_str(value).map_err(|_| ScraperError::InvalidHeader(name.to_string()))?;
	Ok((header_name, header_value))
}
