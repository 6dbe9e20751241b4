//! Markup and word helpers shared by the similarity engine and the validator.

use std::sync::LazyLock;

use regex::Regex;

static RE_BLOCK_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
});
static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("valid regex"));

// Wide enough that html2text never wraps inside a word.
const RENDER_WIDTH: usize = 10_000;

/// Remove tags, comments and script/style blocks. Entities are left as-is.
pub fn strip_markup(html: &str) -> String {
    let without_blocks = RE_BLOCK_CONTENT.replace_all(html, " ");
    let without_comments = RE_COMMENT.replace_all(&without_blocks, " ");
    RE_TAG.replace_all(&without_comments, " ").into_owned()
}

/// Decode named and numeric character references, collapsing whitespace.
///
/// Expects markup to be stripped already; html2text would otherwise render
/// links and emphasis with its own decorations.
pub fn decode_entities(text: &str) -> String {
    let rendered = html2text::from_read(text.as_bytes(), RENDER_WIDTH)
        .unwrap_or_else(|_| text.to_string());
    collapse_whitespace(&rendered)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of a rich-text fragment: markup stripped, entities decoded,
/// whitespace collapsed.
pub fn plain_text(html: &str) -> String {
    decode_entities(&strip_markup(html))
}

/// Number of words in a rich-text fragment.
///
/// A word is a whitespace-separated token containing at least one letter.
pub fn word_count(html: &str) -> usize {
    plain_text(html)
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphabetic))
        .count()
}

/// Character length of a fragment once markup is removed.
pub fn plain_len(html: &str) -> usize {
    plain_text(html).chars().count()
}
