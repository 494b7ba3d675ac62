//! Challenge detection.
//!
//! Matches Cloudflare responses against known challenge page signatures and
//! names the challenge so the pipeline can pick a solver.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::challenges::core::{ChallengeResponse, is_cloudflare_response};

/// Challenge families the detector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    JavaScriptV1,
    JavaScriptV2,
    ManagedV3,
    Turnstile,
    RateLimit,
    AccessDenied,
    BotManagement,
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChallengeType::JavaScriptV1 => "javascript v1 (IUAM)",
            ChallengeType::JavaScriptV2 => "javascript v2",
            ChallengeType::ManagedV3 => "managed challenge v3",
            ChallengeType::Turnstile => "turnstile",
            ChallengeType::RateLimit => "rate limit",
            ChallengeType::AccessDenied => "access denied",
            ChallengeType::BotManagement => "bot management",
        };
        f.write_str(name)
    }
}

/// Raw signatures: id, family, weight when every regex matches, regexes.
const SIGNATURES: &[(&str, ChallengeType, f32, &[&str])] = &[
    ("cf_iuam_v1", ChallengeType::JavaScriptV1, 0.95, &[
        r"<title>\s*just a moment\.\.\.\s*</title>",
        r"/cdn-cgi/images/trace/jsch/",
        r#"<form[^>]*id=['"]challenge-form['"][^>]*action=['"][^'"]*__cf_chl_f_tk="#,
    ]),
    ("cf_iuam_v2", ChallengeType::JavaScriptV2, 0.90, &[
        r#"cpo\.src\s*=\s*['"]/cdn-cgi/challenge-platform/.*?orchestrate/jsch/v1"#,
        r"window\._cf_chl_opt\s*=",
        r#"action=['"][^'"]*__cf_chl_rt_tk="#,
    ]),
    ("cf_managed_v3", ChallengeType::ManagedV3, 0.92, &[
        r"/cdn-cgi/challenge-platform/.*?orchestrate/(?:captcha|managed)/v1",
        r"window\._cf_chl_ctx\s*=",
        r#"class=['"]cf-browser-verification"#,
    ]),
    ("cf_turnstile", ChallengeType::Turnstile, 0.98, &[
        r#"class=['"]cf-turnstile['"]"#,
        r"challenges\.cloudflare\.com/turnstile/v0/api\.js",
        r"cf-turnstile-response",
    ]),
    ("cf_rate_limit", ChallengeType::RateLimit, 0.99, &[
        r#"class=['"]cf-error-code['"]>\s*1015\s*<"#,
        r"you are being rate limited",
    ]),
    ("cf_access_denied", ChallengeType::AccessDenied, 0.99, &[
        r#"class=['"]cf-error-code['"]>\s*1020\s*<"#,
        r"has banned your access",
    ]),
    ("cf_bot_management", ChallengeType::BotManagement, 0.95, &[
        r#"class=['"]cf-error-code['"]>\s*1010\s*<"#,
        r"has banned you temporarily",
    ]),
];

/// Scores below this are treated as no match.
const MIN_CONFIDENCE: f32 = 0.45;

/// Compiled form of one [`SIGNATURES`] entry.
struct Signature {
    id: &'static str,
    family: ChallengeType,
    weight: f32,
    regexes: Vec<Regex>,
}

impl Signature {
    /// Share of matching regexes, scaled by the weight.
    fn score(&self, body: &str) -> Option<f32> {
        let hits = self.regexes.iter().filter(|re| re.is_match(body)).count();
        let score = self.weight * hits as f32 / self.regexes.len() as f32;
        (hits > 0 && score >= MIN_CONFIDENCE).then_some(score)
    }
}

static COMPILED: Lazy<Vec<Signature>> = Lazy::new(|| {
    SIGNATURES
        .iter()
        .map(|&(id, family, weight, patterns)| Signature {
            id,
            family,
            weight,
            regexes: patterns
                .iter()
                .map(|pattern| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .dot_matches_new_line(true)
                        .build()
                        .expect("invalid challenge signature")
                })
                .collect(),
        })
        .collect()
});

/// Detection output handed to the pipeline.
#[derive(Debug, Clone)]
pub struct ChallengeDetection {
    pub pattern_id: &'static str,
    pub challenge_type: ChallengeType,
    pub confidence: f32,
    pub url: String,
}

/// Stateless signature matcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChallengeDetector;

impl ChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Identify the challenge in `response`, if any.
    ///
    /// Only Cloudflare-served 403/429/503 responses are considered; the
    /// highest scoring family wins.
    pub fn detect(&self, response: &ChallengeResponse<'_>) -> Option<ChallengeDetection> {
        if !is_cloudflare_response(response) || !matches!(response.status, 403 | 429 | 503) {
            return None;
        }

        COMPILED
            .iter()
            .filter_map(|signature| {
                signature
                    .score(response.body)
                    .map(|score| (signature, score))
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(signature, score)| ChallengeDetection {
                pattern_id: signature.id,
                challenge_type: signature.family,
                confidence: score.min(1.0),
                url: response.url.as_str().to_string(),
            })
    }
}
