//! Browser identities for the bypass session.
//!
//! Profiles come from the embedded `browsers.json`: a header set per browser
//! family plus user-agent strings grouped by platform.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use serde::Deserialize;

const PLATFORMS: [&str; 3] = ["linux", "windows", "darwin"];

#[derive(Debug, Deserialize)]
struct BrowserTable {
    headers: HashMap<String, HeaderSet>,
    user_agents: HashMap<String, HashMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize, Clone)]
struct HeaderSet {
    #[serde(rename = "Accept")]
    accept: String,
    #[serde(rename = "Accept-Language")]
    accept_language: String,
    #[serde(rename = "Accept-Encoding")]
    accept_encoding: String,
}

static BROWSERS: Lazy<Result<BrowserTable, serde_json::Error>> =
    Lazy::new(|| serde_json::from_str(include_str!("browsers.json")));

/// Default request headers for one browser identity.
#[derive(Debug, Clone)]
pub struct UserAgentProfile {
    pub browser: String,
    pub headers: HashMap<String, String>,
}

impl UserAgentProfile {
    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("User-Agent").map(String::as_str)
    }
}

/// Pick a random platform, browser and user-agent string. `br` is dropped
/// from `Accept-Encoding`.
pub fn get_user_agent_profile() -> Result<UserAgentProfile, UserAgentError> {
    let table = BROWSERS
        .as_ref()
        .map_err(|err| UserAgentError::InvalidTable(err.to_string()))?;

    let mut rng = rand::thread_rng();
    let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or("linux");
    let browsers = table
        .user_agents
        .get(platform)
        .ok_or(UserAgentError::ProfileNotFound)?;

    let mut names: Vec<&String> = browsers.keys().collect();
    names.sort();
    let browser = names
        .choose(&mut rng)
        .map(|name| name.to_string())
        .ok_or(UserAgentError::ProfileNotFound)?;

    let agent = browsers
        .get(&browser)
        .and_then(|agents| agents.choose(&mut rng))
        .ok_or(UserAgentError::ProfileNotFound)?;
    let header_set = table
        .headers
        .get(&browser)
        .ok_or(UserAgentError::ProfileNotFound)?;

    Ok(UserAgentProfile {
        headers: header_map(header_set, agent),
        browser,
    })
}

fn header_map(set: &HeaderSet, agent: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("User-Agent".into(), agent.to_string());
    headers.insert("Accept".into(), set.accept.clone());
    headers.insert("Accept-Language".into(), set.accept_language.clone());
    headers.insert("Accept-Encoding".into(), strip_brotli(&set.accept_encoding));
    headers
}

fn strip_brotli(encoding: &str) -> String {
    encoding
        .split(',')
        .map(str::trim)
        .filter(|enc| !enc.eq_ignore_ascii_case("br"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum UserAgentError {
    #[error("embedded browser table is invalid: {0}")]
    InvalidTable(String),
    #[error("no matching user-agent profile found")]
    ProfileNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_profile_has_user_agent_without_brotli() {
        for _ in 0..20 {
            let profile = get_user_agent_profile().unwrap();
            assert!(profile.user_agent().unwrap().starts_with("Mozilla/5.0"));
            assert!(!profile.headers["Accept-Encoding"].contains("br"));
            assert!(profile.headers.contains_key("Accept-Language"));
        }
    }

    #[test]
    fn brotli_is_removed_from_encoding_list() {
        assert_eq!(strip_brotli("gzip, deflate, br"), "gzip, deflate");
        assert_eq!(strip_brotli("br,gzip"), "gzip");
        assert_eq!(strip_brotli("gzip"), "gzip");
    }
}
