//! Interesting meta tag detection.
//!
//! Looks for `<meta>` tags that mention users, credentials, authorship or
//! software versions, and reports them as one informational alert per response.

use crate::alert::AlertValue;
use crate::error::ScanError;
use crate::http::{Request, Response};
use crate::module::ResponseModule;
use crate::workspace::Workspace;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

pub const META_TAG_ALERT: &str = "vinfo-metatags";

const KEYWORDS: [&str; 9] = [
    "user",
    "password",
    "source",
    "author",
    "microsoft",
    "visual",
    "linux",
    "release",
    "version",
];

/// One pattern per keyword: a whole `<meta ...>` tag containing it.
static META_TAG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    KEYWORDS
        .iter()
        .filter_map(|kw| Regex::new(&format!(r"(?i)<meta[^>]*{}[^>]*>", regex::escape(kw))).ok())
        .collect()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct MetaTagModule;

impl MetaTagModule {
    pub fn new() -> Self {
        MetaTagModule
    }

    /// The first matching tag for each keyword, newline terminated, in keyword
    /// order. `None` when nothing matched.
    pub fn scan(body: &str) -> Option<String> {
        let mut output = String::new();
        for pattern in META_TAG_PATTERNS.iter() {
            if let Some(m) = pattern.find(body) {
                output.push_str(m.as_str());
                output.push('\n');
            }
        }
        (!output.is_empty()).then_some(output)
    }
}

impl ResponseModule for MetaTagModule {
    fn name(&self) -> &str {
        "Interesting Meta Tag Detection"
    }

    fn process_response(
        &self,
        scan_id: u64,
        request: &Request,
        response: &Response,
        workspace: &Workspace,
    ) -> Result<(), ScanError> {
        let Some(output) = Self::scan(&response.body_as_string()) else {
            return Ok(());
        };
        trace!("Interesting meta tags found on {}", request.url);
        workspace.publish_alert(
            scan_id,
            META_TAG_ALERT,
            None,
            None,
            request,
            response,
            &[
                ("output", AlertValue::from(output)),
                ("resource", AlertValue::from(request.uri())),
            ],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertStore, InMemoryAlertStore};
    use crate::diagnostics::RecordingSink;
    use crate::request_log::InMemoryRequestLog;
    use crate::stats::ScanStats;
    use std::sync::Arc;
    use url::Url;

    #[test]
    fn test_first_match_per_keyword() {
        let body = r#"<html><head>
            <meta name="Author" content="alice">
            <meta name="generator" content="WordPress Version 5.1">
            <meta name="author" content="bob">
            <meta charset="utf-8">
        </head></html>"#;

        let output = MetaTagModule::scan(body).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"<meta name="Author" content="alice">"#,
                r#"<meta name="generator" content="WordPress Version 5.1">"#,
            ]
        );
    }

    #[test]
    fn test_plain_meta_tags_are_ignored() {
        assert!(MetaTagModule::scan(r#"<meta charset="utf-8"><p>version 2</p>"#).is_none());
    }

    #[test]
    fn test_publishes_unkeyed_alert_with_output_and_resource() {
        let store = Arc::new(InMemoryAlertStore::new());
        let workspace = Workspace::new(
            store.clone(),
            Arc::new(InMemoryRequestLog::new()),
            Arc::new(RecordingSink::new()),
            Arc::new(ScanStats::new()),
        );
        let url = Url::parse("http://example.com/about?lang=en").unwrap();
        let request = Request::get(url.clone());
        let response = Response::new(url, 200, r#"<meta name="release" content="2.3">"#);

        MetaTagModule
            .process_response(9, &request, &response, &workspace)
            .unwrap();
        MetaTagModule
            .process_response(9, &request, &response, &workspace)
            .unwrap();

        let alerts = store.alerts(9);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, META_TAG_ALERT);
        assert_eq!(alerts[0].property("resource").and_then(|v| v.as_str()), Some("/about?lang=en"));
        assert_eq!(
            alerts[0].property("output").and_then(|v| v.as_str()),
            Some("<meta name=\"release\" content=\"2.3\">\n")
        );
    }
}
