//! Structured-output parsing with layered repair.
//!
//! Models regularly return near-miss JSON: fenced in markdown, cut off by the
//! token budget, with trailing commas or unescaped quotes inside Dutch text.
//! [`parse_object`] tries each repair in a fixed order and reports which one
//! produced the object.

use std::fmt;
use std::sync::LazyLock;

use catalog_core::{ContentError, GeneratedContent, Mode};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid regex"));
static OPEN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```(?:json)?\s*").expect("valid regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Which step produced a parseable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// Parsed after fence and control character cleanup.
    Direct,
    BalancedBrackets,
    ClosedString,
    TrailingCommas,
    InnerQuotes,
    LargestObject,
}

impl RepairStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStrategy::Direct => "direct",
            RepairStrategy::BalancedBrackets => "balanced_brackets",
            RepairStrategy::ClosedString => "closed_string",
            RepairStrategy::TrailingCommas => "trailing_commas",
            RepairStrategy::InnerQuotes => "inner_quotes",
            RepairStrategy::LargestObject => "largest_object",
        }
    }
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse model output into a JSON object, repairing it when needed.
pub fn parse_object(raw: &str) -> Result<(Map<String, Value>, RepairStrategy), ContentError> {
    let cleaned = strip_control_chars(&strip_fences(raw));
    let cleaned = cleaned.trim();

    let first_error = match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(map)) => return Ok((map, RepairStrategy::Direct)),
        Ok(_) => "response is not a JSON object".to_string(),
        Err(err) => err.to_string(),
    };
    debug!(error = %first_error, "first parse failed, attempting repair");

    if let Some(found) = repair(cleaned) {
        debug!(strategy = %found.1, "JSON repair succeeded");
        return Ok(found);
    }

    if let Some(map) = largest_object(cleaned).and_then(as_object) {
        debug!(strategy = %RepairStrategy::LargestObject, "JSON repair succeeded");
        return Ok((map, RepairStrategy::LargestObject));
    }

    Err(ContentError::parse(first_error, raw))
}

/// Parse model output and keep the string fields the mode asks for.
///
/// Non-string values count as absent. An object with none of the mode's
/// fields is a parse failure, never an empty success.
pub fn extract_content(raw: &str, mode: Mode) -> Result<(GeneratedContent, RepairStrategy), ContentError> {
    let (object, strategy) = parse_object(raw)?;

    let mut content = GeneratedContent::default();
    for field in mode.fields() {
        let value = object
            .get(field.key())
            .and_then(Value::as_str)
            .map(str::to_string);
        content.set(*field, value);
    }

    if mode.fields().iter().all(|field| content.get(*field).is_none()) {
        return Err(ContentError::parse(
            "response contained none of the expected fields",
            raw,
        ));
    }

    Ok((content, strategy))
}

fn repair(text: &str) -> Option<(Map<String, Value>, RepairStrategy)> {
    if text.is_empty() {
        return None;
    }

    let balanced = balance(text);
    if balanced != text {
        if let Some(map) = as_object(&balanced) {
            return Some((map, RepairStrategy::BalancedBrackets));
        }
    }

    if let Some(closed) = close_truncated_string(text) {
        if let Some(map) = as_object(&balance(&closed)) {
            return Some((map, RepairStrategy::ClosedString));
        }
    }

    let without_commas = TRAILING_COMMA.replace_all(text, "$1");
    if without_commas != text {
        if let Some(map) = as_object(&without_commas).or_else(|| as_object(&balance(&without_commas))) {
            return Some((map, RepairStrategy::TrailingCommas));
        }
    }

    let escaped = escape_inner_quotes(text);
    if escaped != text {
        if let Some(map) = as_object(&escaped) {
            return Some((map, RepairStrategy::InnerQuotes));
        }
    }

    None
}

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn strip_fences(raw: &str) -> String {
    let unfenced = FENCE.replace_all(raw, "$1");
    // A reply cut off by the token budget can open a fence it never closes.
    OPEN_FENCE.replace(&unfenced, "").into_owned()
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\t' | '\n' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Scan state at the end of `text`: unclosed brackets and whether a string
/// literal is still open.
struct ScanState {
    closers: Vec<char>,
    in_string: bool,
    escaped: bool,
}

fn scan(text: &str) -> ScanState {
    let mut state = ScanState {
        closers: Vec::new(),
        in_string: false,
        escaped: false,
    };

    for c in text.chars() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if c == '\\' {
                state.escaped = true;
            } else if c == '"' {
                state.in_string = false;
            }
            continue;
        }
        match c {
            '"' => state.in_string = true,
            '{' => state.closers.push('}'),
            '[' => state.closers.push(']'),
            '}' | ']' => {
                if state.closers.last() == Some(&c) {
                    state.closers.pop();
                }
            }
            _ => {}
        }
    }

    state
}

/// Append the closing brackets the text is missing, innermost first.
fn balance(text: &str) -> String {
    let state = scan(text);
    let mut out = text.to_string();
    out.extend(state.closers.iter().rev());
    out
}

/// Close a string literal left open by truncation. `None` when every string
/// is already closed.
fn close_truncated_string(text: &str) -> Option<String> {
    let state = scan(text);
    if !state.in_string {
        return None;
    }
    let mut out = text.to_string();
    if state.escaped {
        out.pop();
    }
    out.push('"');
    Some(out)
}

/// Escape quotes inside string literals that are not followed by a JSON
/// delimiter, e.g. `"de "Classic" tas"`.
fn escape_inner_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &c) in chars.iter().enumerate() {
        if !in_string {
            in_string = c == '"';
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, None | Some(',' | '}' | ']' | ':')) {
                    in_string = false;
                    out.push(c);
                } else {
                    out.push_str("\\\"");
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn largest_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::Field;

    #[test]
    fn test_clean_object() {
        let (map, strategy) = parse_object(r#"{"short_description": "ok"}"#).unwrap();
        assert_eq!(strategy, RepairStrategy::Direct);
        assert_eq!(map["short_description"], "ok");
    }

    #[test]
    fn test_fenced_object() {
        let raw = "```json\n{\"meta_description\": \"tekst\"}\n```";
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::Direct);
        assert_eq!(map["meta_description"], "tekst");
    }

    #[test]
    fn test_unterminated_fence() {
        let raw = "```json\n{\"meta_description\": \"tekst\"";
        let (map, _) = parse_object(raw).unwrap();
        assert_eq!(map["meta_description"], "tekst");
    }

    #[test]
    fn test_raw_newlines_inside_strings() {
        let raw = "{\"long_description\": \"<h3>Kop</h3>\n<p>Regel\tmet tab</p>\"}";
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::Direct);
        assert_eq!(map["long_description"], "<h3>Kop</h3> <p>Regel met tab</p>");
    }

    #[test]
    fn test_truncated_mid_string() {
        let raw = r#"{"short_description": "ok", "long_description": "cut off mid senten"#;
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::ClosedString);
        assert_eq!(map["short_description"], "ok");
        assert_eq!(map["long_description"], "cut off mid senten");
    }

    #[test]
    fn test_truncated_after_dangling_escape() {
        let raw = r#"{"short_description": "zegt \"#;
        let (map, _) = parse_object(raw).unwrap();
        assert_eq!(map["short_description"], "zegt ");
    }

    #[test]
    fn test_missing_closing_brace() {
        let raw = r#"{"short_description": "ok", "tags": ["a", "b""#;
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::BalancedBrackets);
        assert_eq!(map["tags"][1], "b");
    }

    #[test]
    fn test_trailing_comma() {
        let (map, strategy) = parse_object(r#"{"a":1,}"#).unwrap();
        assert_eq!(strategy, RepairStrategy::TrailingCommas);
        assert_eq!(Value::Object(map), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_unescaped_inner_quote() {
        let raw = r#"{"short_description": "de "Classic" tas"}"#;
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::InnerQuotes);
        assert!(map["short_description"].as_str().unwrap().contains("Classic"));
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Hier is het resultaat: {\"meta_description\": \"tekst\"} Veel succes!";
        let (map, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, RepairStrategy::LargestObject);
        assert_eq!(map["meta_description"], "tekst");
    }

    #[test]
    fn test_hopeless_input_keeps_raw_excerpt() {
        let raw = "Sorry, daar kan ik niet mee helpen.";
        match parse_object(raw).unwrap_err() {
            ContentError::Parse { raw: excerpt, .. } => assert_eq!(excerpt, raw),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_array_is_not_an_object() {
        assert!(matches!(
            parse_object(r#"["short_description"]"#),
            Err(ContentError::Parse { .. })
        ));
    }

    #[test]
    fn test_extract_keeps_only_mode_fields() {
        let raw = r#"{"short_description": "kort", "long_description": "lang", "meta_description": 5}"#;
        let (content, _) = extract_content(raw, Mode::ShortOnly).unwrap();
        assert_eq!(content.get(Field::Short), Some("kort"));
        assert_eq!(content.get(Field::Long), None);

        let (content, _) = extract_content(raw, Mode::Full).unwrap();
        assert_eq!(content.get(Field::Long), Some("lang"));
        assert_eq!(content.get(Field::Meta), None);
    }

    #[test]
    fn test_extract_without_expected_fields_fails() {
        let err = extract_content(r#"{"ok": true}"#, Mode::MetaOnly).unwrap_err();
        match err {
            ContentError::Parse { detail, .. } => assert!(detail.contains("none of the expected")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
