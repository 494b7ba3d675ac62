use url::Url;

use super::BypassError;

/// Substring every supported link contains.
pub const HOST_MARKER: &str = "gplinks.co/";
/// Example shown when the host is wrong.
pub const URL_HINT: &str = "https://gplinks.co/xxx";

/// Check `text` before any network call: syntax first, then host.
pub fn validate(text: &str) -> Result<(), BypassError> {
    if !is_well_formed(text) {
        return Err(BypassError::MalformedUrl);
    }
    if !text.contains(HOST_MARKER) {
        return Err(BypassError::UnsupportedHost {
            hint: URL_HINT.to_string(),
        });
    }
    Ok(())
}

/// Absolute http(s) URL with a host and no whitespace.
fn is_well_formed(text: &str) -> bool {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return false;
    }

    match Url::parse(text) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}
