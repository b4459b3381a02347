//! Tag derivation at ingestion time.
//!
//! Tags are never user-authored: they are derived from the report itself so
//! that groups can be sliced by browser family, error type, environment,
//! and URL path.

use url::Url;

use super::types::{ErrorReport, Tag};

/// Known browser tokens, matched against the raw user-agent string.
const BROWSER_TOKENS: &[&str] = &[
    "Chrome", "Firefox", "Safari", "Edge", "Opera", "MSIE", "Trident",
];

/// Derive the tags for an incoming report.
pub fn derive_tags(report: &ErrorReport) -> Vec<Tag> {
    let mut tags = Vec::new();

    if let Some(user_agent) = report.user_agent.as_deref() {
        if let Some(browser) = match_browser(user_agent) {
            tags.push(Tag::new("browser", browser));
        }
    }

    if let Some(error_type) = report.error_type.as_deref() {
        tags.push(Tag::new("errorType", error_type));
    }

    tags.push(Tag::new("environment", report.environment.clone()));

    if let Some(raw_url) = report.url.as_deref() {
        match Url::parse(raw_url) {
            Ok(parsed) => {
                let path = parsed.path();
                if !path.is_empty() {
                    tags.push(Tag::new("path", path));
                }
            }
            // Unparseable URLs are still worth slicing on; keep the raw value.
            Err(_) => tags.push(Tag::new("url", raw_url)),
        }
    }

    tags
}

/// Match the browser token appearing earliest in the user-agent string.
fn match_browser(user_agent: &str) -> Option<&'static str> {
    BROWSER_TOKENS
        .iter()
        .filter_map(|token| user_agent.find(token).map(|position| (position, *token)))
        .min_by_key(|(position, _)| *position)
        .map(|(_, token)| token)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn report(user_agent: Option<&str>, error_type: Option<&str>, url: Option<&str>) -> ErrorReport {
        ErrorReport {
            message: "boom".to_owned(),
            source: None,
            line: None,
            column: None,
            stack: None,
            error_type: error_type.map(str::to_owned),
            component_stack: None,
            url: url.map(str::to_owned),
            user_agent: user_agent.map(str::to_owned),
            session_id: "session_0_test".to_owned(),
            user_id: None,
            project_id: Uuid::nil(),
            environment: "production".to_owned(),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn chrome_user_agent_tagged_as_chrome() {
        // Chrome UAs also contain "Safari"; the earlier token wins.
        let ua = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/120.0.0.0 Safari/537.36";
        let tags = derive_tags(&report(Some(ua), None, None));
        assert!(tags.contains(&Tag::new("browser", "Chrome")));
        assert!(!tags.contains(&Tag::new("browser", "Safari")));
    }

    #[test]
    fn firefox_user_agent_tagged() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
        let tags = derive_tags(&report(Some(ua), None, None));
        assert!(tags.contains(&Tag::new("browser", "Firefox")));
    }

    #[test]
    fn unknown_user_agent_has_no_browser_tag() {
        let tags = derive_tags(&report(Some("curl/8.0"), None, None));
        assert!(!tags.iter().any(|tag| tag.key == "browser"));
    }

    #[test]
    fn error_type_and_environment_tagged() {
        let tags = derive_tags(&report(None, Some("TypeError"), None));
        assert!(tags.contains(&Tag::new("errorType", "TypeError")));
        assert!(tags.contains(&Tag::new("environment", "production")));
    }

    #[test]
    fn url_path_extracted() {
        let tags = derive_tags(&report(
            None,
            None,
            Some("https://app.example.com/checkout/payment?step=2"),
        ));
        assert!(tags.contains(&Tag::new("path", "/checkout/payment")));
    }

    #[test]
    fn unparseable_url_kept_raw() {
        let tags = derive_tags(&report(None, None, Some("not a url")));
        assert!(tags.contains(&Tag::new("url", "not a url")));
        assert!(!tags.iter().any(|tag| tag.key == "path"));
    }
}
