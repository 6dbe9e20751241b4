//! Allow-list markup sanitizer for rich-text fields and a plain-text cleaner
//! for meta descriptions.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Tags that survive sanitizing, with the attributes each may keep.
const ALLOWED_TAGS: &[(&str, &[&str])] = &[
    ("a", &["href", "title", "rel", "target"]),
    ("b", &[]),
    ("blockquote", &[]),
    ("br", &[]),
    ("em", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("i", &[]),
    ("li", &[]),
    ("ol", &[]),
    ("p", &[]),
    ("span", &["class"]),
    ("strong", &[]),
    ("table", &[]),
    ("tbody", &[]),
    ("td", &[]),
    ("th", &[]),
    ("thead", &[]),
    ("tr", &[]),
    ("u", &[]),
    ("ul", &[]),
];

static RE_DANGEROUS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed|noscript|template)\b[^>]*>.*?</(script|style|iframe|object|embed|noscript|template)\s*>")
        .expect("valid regex")
});
static RE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(/?)([A-Za-z][A-Za-z0-9]*)([^>]*)>").expect("valid regex")
});
static RE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][A-Za-z0-9_:.-]*)\s*=\s*("[^"]*"|'[^']*'|[^\s"'>]+)"#)
        .expect("valid regex")
});
static RE_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));

/// Keep allow-listed tags and attributes, drop everything else.
///
/// Script-like blocks are removed with their content; other unknown tags
/// are removed while their inner text is kept.
pub fn sanitize_rich_text(html: &str) -> String {
    let html = RE_CONTROL.replace_all(html, "");
    let html = RE_DANGEROUS_BLOCK.replace_all(&html, "");
    let html = RE_COMMENT.replace_all(&html, "");

    RE_TAG
        .replace_all(&html, |caps: &Captures<'_>| {
            let closing = !caps[1].is_empty();
            let name = caps[2].to_ascii_lowercase();
            let Some((_, allowed_attrs)) = ALLOWED_TAGS.iter().find(|(tag, _)| *tag == name)
            else {
                return String::new();
            };

            if closing {
                return format!("</{}>", name);
            }

            let mut tag = format!("<{}", name);
            for attr in RE_ATTR.captures_iter(&caps[3]) {
                let attr_name = attr[1].to_ascii_lowercase();
                if !allowed_attrs.contains(&attr_name.as_str()) {
                    continue;
                }
                let value = attr[2].trim_matches(|c| c == '"' || c == '\'');
                if attr_name == "href" && !is_safe_url(value) {
                    continue;
                }
                tag.push_str(&format!(" {}=\"{}\"", attr_name, value.replace('"', "&quot;")));
            }
            if caps[3].trim_end().ends_with('/') {
                tag.push_str(" /");
            }
            tag.push('>');
            tag
        })
        .into_owned()
}

/// Plain single-line text: markup removed, entities decoded, control
/// characters dropped, whitespace collapsed.
pub fn sanitize_plain_text(text: &str) -> String {
    let text = RE_CONTROL.replace_all(text, "");
    catalog_core::text::plain_text(&text)
}

fn is_safe_url(value: &str) -> bool {
    let lowered: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    !["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_markup_is_kept() {
        let html = "<h3>Kenmerken</h3><ul><li><strong>Waterdicht</strong></li></ul>";
        assert_eq!(sanitize_rich_text(html), html);
    }

    #[test]
    fn test_script_blocks_are_removed_with_content() {
        let html = "<p>Tekst</p><script>alert('x')</script><style>p{}</style>";
        assert_eq!(sanitize_rich_text(html), "<p>Tekst</p>");
    }

    #[test]
    fn test_unknown_tags_keep_inner_text() {
        let html = "<div class=\"x\"><p>Binnen</p></div><font>oud</font>";
        assert_eq!(sanitize_rich_text(html), "<p>Binnen</p>oud");
    }

    #[test]
    fn test_attributes_are_filtered() {
        let html = "<p onclick=\"evil()\" style=\"color:red\">a</p>\
            <a href=\"https://example.com\" onmouseover=\"x()\">link</a>\
            <a href=\"javascript:alert(1)\">bad</a>";
        assert_eq!(
            sanitize_rich_text(html),
            "<p>a</p><a href=\"https://example.com\">link</a><a>bad</a>"
        );
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        assert_eq!(sanitize_rich_text("<H3>Kop</H3><BR/>"), "<h3>Kop</h3><br />");
    }

    #[test]
    fn test_plain_text_sanitizer() {
        let meta = "  <b>Stevige</b> fietstas\t met\u{0007} &amp; reflectie\n ";
        assert_eq!(sanitize_plain_text(meta), "Stevige fietstas met & reflectie");
    }
}
