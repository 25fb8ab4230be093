//! Payload extraction from fetched pages

use scraper::{Html, Selector};
use tracing::trace;

/// Script tags that may carry the embedded page state
const SCRIPT_SELECTOR: &str = r#"script[type="text/javascript"]"#;

/// Global the page state is assigned to
const SHARED_DATA_VAR: &str = "window._sharedData";

/// Extraction collaborator: raw document bytes in, payload out
///
/// Must be pure and tolerant: a document without a payload yields an empty
/// string, never an error.
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &[u8]) -> String;
}

/// Pulls the JSON assigned to `window._sharedData` out of an HTML page
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedDataExtractor;

impl SharedDataExtractor {
    pub fn new() -> Self {
        Self
    }

    fn assigned_value(script: &str) -> Option<&str> {
        let rest = script.strip_prefix(SHARED_DATA_VAR)?;
        let value = rest.trim_start().strip_prefix('=')?.trim();
        Some(value.strip_suffix(';').unwrap_or(value))
    }
}

impl Extractor for SharedDataExtractor {
    fn extract(&self, document: &[u8]) -> String {
        let Ok(selector) = Selector::parse(SCRIPT_SELECTOR) else {
            return String::new();
        };

        let html = Html::parse_document(&String::from_utf8_lossy(document));
        for script in html.select(&selector) {
            let text: String = script.text().collect();
            if let Some(value) = Self::assigned_value(&text) {
                trace!(size = value.len(), "Found shared data script");
                return value.to_string();
            }
        }

        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_shared_data() {
        let page = br#"<html><head>
            <script type="text/javascript">var other = 1;</script>
            <script type="text/javascript">window._sharedData = {"id":"abc"};</script>
            </head><body></body></html>"#;

        assert_eq!(SharedDataExtractor::new().extract(page), r#"{"id":"abc"}"#);
    }

    #[test]
    fn test_ignores_other_script_types() {
        let page = br#"<script type="application/json">window._sharedData = {"id":"x"};</script>"#;
        assert_eq!(SharedDataExtractor::new().extract(page), "");
    }

    #[test]
    fn test_missing_payload_yields_empty_string() {
        assert_eq!(SharedDataExtractor::new().extract(b"<html></html>"), "");
        assert_eq!(SharedDataExtractor::new().extract(b""), "");
        assert_eq!(SharedDataExtractor::new().extract(&[0xff, 0xfe, 0x00]), "");
    }
}
