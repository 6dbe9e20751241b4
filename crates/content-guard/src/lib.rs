//! Safety and quality gate for generated product descriptions.
//!
//! [`validate`] runs two checks over the fields a generation produced:
//!
//! - **Safety**: every present field is reduced to plain lowercase text and
//!   scanned for the phrases in [`BLOCKED_TERMS`]. Any hit rejects the whole
//!   result. Fields are scanned one at a time, so a phrase split across two
//!   fields is not detected.
//! - **Quality floor**: word and length minimums per field, evaluated only
//!   for fields that are present. Every failed rule is reported.
//!
//! On success the fields come back sanitized: rich text through
//! [`sanitize_rich_text`], meta through [`sanitize_plain_text`].

mod sanitize;

use std::sync::LazyLock;

use catalog_core::text::{plain_len, plain_text, word_count};
use catalog_core::{ContentError, Field, GeneratedContent, Tier};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

pub use sanitize::{sanitize_plain_text, sanitize_rich_text};

/// Forbidden phrases: medical and efficacy claims, superlatives, and
/// sales-pressure wording that may not appear on product pages.
pub const BLOCKED_TERMS: &[&str] = &[
    "100%",
    "garandeert",
    "klinisch bewezen",
    "geneest",
    "therapeutisch",
    "medisch bewezen",
    "anti-aging effect",
    "anti-aging werking",
    "dermatologisch getest",
    "clinically proven",
    "guaranteed",
    "miracle",
    "revolutionair",
    "beste prijs",
    "koop nu",
    "vandaag besteld",
    "op voorraad",
    "nummer 1",
    "100% effectief",
    "vermindert rimpels",
    "behandelt acne",
    "herstelt beschadigde huid",
    "voorkomt haaruitval",
    "stimuleert haargroei",
    "verwijdert pigmentvlekken",
    "geneest psoriasis",
    "verlicht eczeem",
    "anti-cellulitis",
    "vetverbrandend",
    "versnelt de stofwisseling",
    "detoxificeert",
    "zuivert het bloed",
];

/// Minimum words in a short description.
pub const SHORT_MIN_WORDS: usize = 30;

/// Allowed meta description length in characters, inclusive.
pub const META_CHARS: (usize, usize) = (80, 165);

static RE_SUBHEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h3[\s>]").expect("valid regex"));

/// Minimum words in a long description for a tier.
pub fn long_min_words(tier: Tier) -> usize {
    match tier {
        Tier::High => 200,
        Tier::Mid => 100,
        Tier::Low => 60,
    }
}

/// Validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// Blocked phrases found, in blocklist order.
    #[error("blocked terms: {}", .0.join(", "))]
    SafetyViolation(Vec<String>),

    /// Every quality rule that failed.
    #[error("quality floor not met: {}", .0.join(" | "))]
    QualityFloor(Vec<String>),
}

impl From<GuardError> for ContentError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::SafetyViolation(terms) => ContentError::SafetyViolation(terms),
            GuardError::QualityFloor(rules) => ContentError::QualityFloor(rules),
        }
    }
}

/// Check a generation result and return sanitized copies of its fields.
pub fn validate(content: &GeneratedContent, tier: Tier) -> Result<GeneratedContent, GuardError> {
    let hits = blocked_terms_in(content);
    if !hits.is_empty() {
        warn!(terms = ?hits, "generated content contains blocked terms");
        return Err(GuardError::SafetyViolation(hits));
    }

    let failures = quality_failures(content, tier);
    if !failures.is_empty() {
        warn!(rules = ?failures, tier = %tier, "generated content below quality floor");
        return Err(GuardError::QualityFloor(failures));
    }

    Ok(sanitize(content))
}

/// Sanitize every present field without validating it.
pub fn sanitize(content: &GeneratedContent) -> GeneratedContent {
    GeneratedContent {
        short_description: content.short_description.as_deref().map(sanitize_rich_text),
        long_description: content.long_description.as_deref().map(sanitize_rich_text),
        meta_description: content.meta_description.as_deref().map(sanitize_plain_text),
    }
}

/// Blocked phrases present in any single field, case-insensitive.
pub fn blocked_terms_in(content: &GeneratedContent) -> Vec<String> {
    // Newline-joined so phrases never match across a field boundary.
    let haystack = content
        .present()
        .map(|(_, text)| plain_text(text).to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    BLOCKED_TERMS
        .iter()
        .filter(|term| haystack.contains(&term.to_lowercase()))
        .map(|term| term.to_string())
        .collect()
}

fn quality_failures(content: &GeneratedContent, tier: Tier) -> Vec<String> {
    let mut failures = Vec::new();

    for (field, text) in content.present() {
        match field {
            Field::Short => {
                let words = word_count(text);
                if words < SHORT_MIN_WORDS {
                    failures.push(format!(
                        "short description too short ({} words, min {})",
                        words, SHORT_MIN_WORDS
                    ));
                }
            }
            Field::Long => {
                let words = word_count(text);
                let min = long_min_words(tier);
                if words < min {
                    failures.push(format!(
                        "long description too short ({} words, min {})",
                        words, min
                    ));
                }
                if !RE_SUBHEADING.is_match(text) {
                    failures.push("long description has no <h3> subheadings".to_string());
                }
            }
            Field::Meta => {
                let chars = plain_len(text);
                let (min, max) = META_CHARS;
                if chars < min {
                    failures.push(format!("meta description too short ({} chars, min {})", chars, min));
                }
                if chars > max {
                    failures.push(format!("meta description too long ({} chars, max {})", chars, max));
                }
            }
        }
    }

    failures
}
