//! Full-text extraction for page files

use scraper::{Html, Selector};
use tracing::warn;

const HTML: &str = "text/html";

/// Extracts plain text from files whose MIME type is in a configured list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextExtractor {
    types: Vec<String>,
}

impl TextExtractor {
    /// Parse a comma-separated MIME type list such as `text/html,text/plain`
    pub fn from_list(list: Option<&str>) -> Self {
        let types = list
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { types }
    }

    pub fn is_enabled(&self) -> bool {
        !self.types.is_empty()
    }

    pub fn applies_to(&self, mimetype: &str) -> bool {
        self.types.iter().any(|t| t.eq_ignore_ascii_case(mimetype))
    }

    /// Text of a listed file, or `None` if its type has no extractor
    pub fn extract(&self, mimetype: &str, data: &[u8]) -> Option<String> {
        if !self.applies_to(mimetype) {
            return None;
        }
        if mimetype.eq_ignore_ascii_case(HTML) {
            Some(html_to_text(&String::from_utf8_lossy(data)))
        } else {
            warn!(mimetype, "Text extraction is not supported for this type");
            None
        }
    }
}

/// Visible text of an HTML document's body, whitespace collapsed
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut words = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}
