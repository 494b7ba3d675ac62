//! Challenge page parsing helpers.
//!
//! Reads the Cloudflare "I'm Under Attack" form out of a challenge page so the
//! JavaScript solver only has to compute the answer.

use http::header::SERVER;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use super::types::{ChallengeResponse, ChallengeSubmission};

/// Hidden fields every IUAM form must carry.
const REQUIRED_FIELDS: [&str; 3] = ["r", "jschl_vc", "pass"];

static CHALLENGE_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form#challenge-form").unwrap());
static FORM_INPUT: Lazy<Selector> = Lazy::new(|| Selector::parse("input").unwrap());

/// Action and hidden fields of an IUAM challenge form.
#[derive(Debug, Clone)]
pub struct IuamChallengeBlueprint {
    pub action: String,
    pub hidden_fields: Vec<(String, String)>,
}

impl IuamChallengeBlueprint {
    /// Merge the solver's answer with the hidden fields and resolve the form
    /// action against the page URL.
    pub fn to_submission(
        self,
        base_url: &Url,
        answer: Vec<(String, String)>,
    ) -> Result<ChallengeSubmission, ChallengeParseError> {
        let submit_url = base_url
            .join(&self.action)
            .map_err(ChallengeParseError::InvalidAction)?;

        let mut form_fields = self.hidden_fields;
        form_fields.extend(answer);
        Ok(ChallengeSubmission::post(submit_url, form_fields))
    }
}

#[derive(Debug, Error)]
pub enum ChallengeParseError {
    #[error("response is not a Cloudflare challenge")]
    NotCloudflare,
    #[error("unable to locate challenge form")]
    FormNotFound,
    #[error("missing required hidden field: {0}")]
    MissingField(&'static str),
    #[error("invalid challenge action: {0}")]
    InvalidAction(url::ParseError),
}

/// Extract the IUAM form (action + hidden fields) from a challenge page.
pub fn parse_iuam_challenge(
    response: &ChallengeResponse<'_>,
) -> Result<IuamChallengeBlueprint, ChallengeParseError> {
    if !is_cloudflare_response(response) {
        return Err(ChallengeParseError::NotCloudflare);
    }

    let document = Html::parse_document(response.body);
    let form = document
        .select(&CHALLENGE_FORM)
        .next()
        .ok_or(ChallengeParseError::FormNotFound)?;

    let action = form
        .value()
        .attr("action")
        .filter(|action| action.contains("__cf_chl_f_tk="))
        .map(|action| html_escape::decode_html_entities(action).to_string())
        .ok_or(ChallengeParseError::FormNotFound)?;

    let hidden_fields: Vec<(String, String)> = form
        .select(&FORM_INPUT)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value")?;
            REQUIRED_FIELDS
                .contains(&name)
                .then(|| (name.to_string(), value.to_string()))
        })
        .collect();

    for key in REQUIRED_FIELDS {
        if !hidden_fields.iter().any(|(name, _)| name == key) {
            return Err(ChallengeParseError::MissingField(key));
        }
    }

    Ok(IuamChallengeBlueprint {
        action,
        hidden_fields,
    })
}

/// Whether the response was served by Cloudflare's edge.
pub fn is_cloudflare_response(response: &ChallengeResponse<'_>) -> bool {
    response
        .headers
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("cloudflare"))
        .unwrap_or(false)
}

/// Build origin header value from URL (`scheme://host[:port]`).
pub fn origin_from_url(url: &Url) -> String {
    url.origin().ascii_serialization()
}
