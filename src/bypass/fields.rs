use std::collections::HashMap;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static GO_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("#go-link").unwrap());
static INPUT: Lazy<Selector> = Lazy::new(|| Selector::parse("input").unwrap());

/// Collect `name -> value` of every input under each `#go-link` element.
///
/// Document order, later inputs overwrite earlier ones with the same name.
/// Unnamed inputs are skipped and a missing `value` becomes `""`. A page
/// without `#go-link` gives an empty map.
pub fn extract_go_link_fields(html: &str) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let mut fields = HashMap::new();

    for container in document.select(&GO_LINK) {
        for input in container.select(&INPUT) {
            let Some(name) = input.value().attr("name") else {
                continue;
            };
            let value = input.value().attr("value").unwrap_or_default();
            fields.insert(name.to_string(), value.to_string());
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_duplicate_name_wins() {
        let html = r#"
            <form id="go-link">
              <input name="token" value="a">
              <input name="token" value="b">
            </form>
        "#;
        let fields = extract_go_link_fields(html);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("token").map(String::as_str), Some("b"));
    }

    #[test]
    fn skips_unnamed_and_defaults_missing_values() {
        let html = r#"
            <form id="go-link" method="post">
              <input type="hidden" name="_csrfToken" value="c5rf">
              <input type="hidden" name="ad_form_data">
              <input type="submit" value="Get Link">
              <div><input type="hidden" name="_Token[fields]" value="f%3A"></div>
            </form>
            <input name="outside" value="ignored">
        "#;
        let fields = extract_go_link_fields(html);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["_csrfToken"], "c5rf");
        assert_eq!(fields["ad_form_data"], "");
        assert_eq!(fields["_Token[fields]"], "f%3A");
        assert!(!fields.contains_key("outside"));
    }

    #[test]
    fn page_without_go_link_is_empty() {
        assert!(extract_go_link_fields("<html><body>nothing</body></html>").is_empty());
    }
}
