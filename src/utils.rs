use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Plain text of an HTML fragment.
///
/// The text nodes are concatenated the way a browser's `textContent` would, entities are
/// decoded by the HTML parser, and runs of whitespace left behind by the markup are collapsed
/// into single spaces.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let raw: String = fragment.root_element().text().collect();
    collapse_whitespace(&raw)
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
