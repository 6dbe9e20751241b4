//! Cosine similarity between an item's existing description and a freshly
//! generated one.
//!
//! Both texts are normalized before comparison:
//!
//! 1. markup stripped, entities decoded, lowercased
//! 2. noise tokens (title words, brand) longer than two characters removed
//!    by literal substring replacement
//! 3. every non-letter character replaced by whitespace
//! 4. tokens of two characters or fewer and Dutch stopwords dropped
//!
//! Each text becomes a term-frequency vector (`count / total tokens`). When
//! either vector has fewer than [`MIN_TERMS`] distinct terms the comparison
//! is inconclusive and always allowed.
//!
//! | Zone    | Score        | Meaning                                   |
//! |---------|--------------|-------------------------------------------|
//! | `block` | `>= 0.70`    | too close, existing content is kept       |
//! | `warn`  | `>= 0.60`    | review before saving                      |
//! | `allow` | `< 0.60`     | meaningful rewrite                        |
//!
//! # Example
//!
//! ```rust
//! use similarity::compare;
//! use catalog_core::Zone;
//!
//! let text = "Stevige waterdichte fietstas met reflecterende strepen en ruime binnenvakken.";
//! let verdict = compare(text, text, &["Fietstas"]);
//! assert_eq!(verdict.zone, Zone::Block);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use catalog_core::text::{decode_entities, strip_markup};
use catalog_core::{SimilarityVerdict, VerdictNote};

/// Minimum number of distinct qualifying terms per text.
pub const MIN_TERMS: usize = 5;

/// Tokens and noise words must be longer than this many characters.
const MIN_TOKEN_CHARS: usize = 2;

/// Dutch stopwords ignored during comparison.
pub const STOPWORDS: &[&str] = &[
    "de", "het", "een", "van", "in", "is", "dat", "op", "en", "te", "voor", "met", "aan", "er",
    "maar", "om", "ook", "als", "dan", "dit", "bij", "zo", "al", "niet", "zijn", "was", "worden",
    "heeft", "hebben", "werd", "kan", "zal", "meer", "door", "over", "naar", "uit", "nog", "wel",
    "of", "want", "hoe", "wat", "wie", "waar", "we", "ze", "hij", "zij", "ik", "u", "onze", "uw",
    "hun", "elk", "alle", "elke", "wordt", "had",
];

/// Term-frequency vector, ordered so summation order never depends on input order.
type TermVector = BTreeMap<String, f64>;

/// Something that can judge how close two descriptions are.
pub trait Comparator: Send + Sync {
    fn compare(&self, existing: &str, candidate: &str, noise: &[String]) -> SimilarityVerdict;
}

/// The production comparator: [`compare`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineComparator;

impl Comparator for CosineComparator {
    fn compare(&self, existing: &str, candidate: &str, noise: &[String]) -> SimilarityVerdict {
        compare(existing, candidate, noise)
    }
}

/// Compare existing text with a candidate, ignoring `noise` tokens.
pub fn compare<S: AsRef<str>>(existing: &str, candidate: &str, noise: &[S]) -> SimilarityVerdict {
    let vec_a = vectorize(existing, noise);
    let vec_b = vectorize(candidate, noise);

    if vec_a.len() < MIN_TERMS || vec_b.len() < MIN_TERMS {
        tracing::debug!(
            existing_terms = vec_a.len(),
            candidate_terms = vec_b.len(),
            "similarity inconclusive"
        );
        return SimilarityVerdict::inconclusive(VerdictNote::InsufficientLength);
    }

    SimilarityVerdict::scored(cosine(&vec_a, &vec_b))
}

/// Qualifying tokens of a text after normalization, in order.
pub fn normalized_tokens<S: AsRef<str>>(text: &str, noise: &[S]) -> Vec<String> {
    let mut text = decode_entities(&strip_markup(text)).to_lowercase();

    for token in noise {
        let token = token.as_ref().trim().to_lowercase();
        if token.chars().count() > MIN_TOKEN_CHARS {
            text = text.replace(&token, " ");
        }
    }

    let letters: String = text
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();

    letters
        .split_whitespace()
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS && !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

fn vectorize<S: AsRef<str>>(text: &str, noise: &[S]) -> TermVector {
    let tokens = normalized_tokens(text, noise);
    let total = tokens.len().max(1) as f64;

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(term, count)| (term, count as f64 / total))
        .collect()
}

fn cosine(vec_a: &TermVector, vec_b: &TermVector) -> f64 {
    let terms: BTreeSet<&String> = vec_a.keys().chain(vec_b.keys()).collect();

    let (mut dot, mut mag_a, mut mag_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for term in terms {
        let a = vec_a.get(term).copied().unwrap_or(0.0);
        let b = vec_b.get(term).copied().unwrap_or(0.0);
        dot += a * b;
        mag_a += a * a;
        mag_b += b * b;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    let score = (dot / (mag_a.sqrt() * mag_b.sqrt())).min(1.0);
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::Zone;

    const NONE: &[&str] = &[];

    const BAG_COPY: &str = "<p>Deze stevige fietstas biedt ruime opbergruimte, \
        reflecterende strepen en een waterafstotende buitenlaag. Handig voor \
        dagelijkse ritten naar kantoor of school.</p>";

    #[test]
    fn test_identical_text_scores_one() {
        let verdict = compare(BAG_COPY, BAG_COPY, NONE);
        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.percent, 100);
        assert_eq!(verdict.zone, Zone::Block);
        assert!(verdict.note.is_none());
    }

    #[test]
    fn test_unrelated_text_allows() {
        let other = "Zachte katoenen handdoek in lichtgrijs, snel drogend, \
            geschikt voor sauna, strand en zwembad gebruik.";
        let verdict = compare(BAG_COPY, other, NONE);
        assert_eq!(verdict.zone, Zone::Allow);
        assert!(verdict.score < 0.2);
    }

    #[test]
    fn test_short_existing_text_is_inconclusive() {
        let verdict = compare("Korte fietstas voor dagelijks gebruik.", BAG_COPY, NONE);
        assert_eq!(verdict.zone, Zone::Allow);
        assert_eq!(verdict.score, 0.0);
        assert_eq!(verdict.percent, 0);
        assert_eq!(verdict.note, Some(VerdictNote::InsufficientLength));
    }

    #[test]
    fn test_empty_text_is_inconclusive() {
        let verdict = compare("", "", NONE);
        assert_eq!(verdict.note, Some(VerdictNote::InsufficientLength));
        assert_eq!(verdict.zone, Zone::Allow);
    }

    #[test]
    fn test_long_text_of_stopwords_is_inconclusive() {
        let stopwords = "de het een van en voor met ".repeat(50);
        let verdict = compare(&stopwords, BAG_COPY, NONE);
        assert_eq!(verdict.note, Some(VerdictNote::InsufficientLength));
    }

    #[test]
    fn test_noise_tokens_are_removed() {
        let tokens = normalized_tokens("Basil Classic fietstas van Basil", &["Basil", "Classic"]);
        assert_eq!(tokens, vec!["fietstas"]);
    }

    #[test]
    fn test_short_noise_tokens_are_ignored() {
        let tokens = normalized_tokens("xlarge tas", &["xl", " "]);
        assert_eq!(tokens, vec!["xlarge", "tas"]);
    }

    #[test]
    fn test_markup_entities_and_digits_are_normalized() {
        let tokens = normalized_tokens("<h3>Inhoud &amp; formaat</h3> 20 liter, één vak", NONE);
        assert_eq!(tokens, vec!["inhoud", "formaat", "liter", "één", "vak"]);
    }

    #[test]
    fn test_accented_entities_stay_inside_words() {
        let tokens = normalized_tokens("Cr&egrave;me br&ucirc;l&eacute;e gar&ccedil;on", NONE);
        assert_eq!(tokens, vec!["crème", "brûlée", "garçon"]);
    }

    #[test]
    fn test_brand_in_both_texts_does_not_inflate_score() {
        let existing = "Ortlieb Ortlieb Ortlieb Ortlieb zadeltas compact lichtgewicht \
            grijs klittenband";
        let candidate = "Ortlieb Ortlieb Ortlieb Ortlieb stuurtas magneetsluiting \
            kaartvak schouderband zwart";
        let with_noise = compare(existing, candidate, &["Ortlieb"]);
        let without_noise = compare(existing, candidate, NONE);
        assert!(with_noise.score < without_noise.score);
        assert_eq!(with_noise.score, 0.0);
    }

    #[test]
    fn test_symmetry_on_fixture() {
        let other = "Ruime fietstas met reflecterende strepen, waterafstotende \
            buitenlaag en extra opbergruimte voor ritten naar school.";
        assert_eq!(compare(BAG_COPY, other, NONE), compare(other, BAG_COPY, NONE));
    }

    #[test]
    fn test_comparator_trait_delegates() {
        let noise: Vec<String> = vec![];
        let verdict = CosineComparator.compare(BAG_COPY, BAG_COPY, &noise);
        assert_eq!(verdict.zone, Zone::Block);
    }
}
