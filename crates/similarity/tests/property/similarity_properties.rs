use catalog_core::{VerdictNote, Zone};
use proptest::prelude::*;
use similarity::compare;

const VOCAB: &[&str] = &[
    "fietstas", "waterdicht", "reflecterend", "stevig", "ruim", "lichtgewicht", "canvas",
    "leder", "schouderband", "klittenband", "binnenvak", "regenhoes", "stuurtas", "zadelpen",
    "de", "het", "een", "en", "met", "voor", "xl", "20", "<p>", "</p>", "&amp;",
];

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(VOCAB), 0..40).prop_map(|words| words.join(" "))
}

const NONE: &[&str] = &[];

proptest! {
    #[test]
    fn score_stays_in_unit_range(a in text(), b in text()) {
        let verdict = compare(&a, &b, NONE);
        prop_assert!((0.0..=1.0).contains(&verdict.score));
        prop_assert!(verdict.percent <= 100);
        prop_assert_eq!(verdict.zone, Zone::from_score(verdict.score));
    }

    #[test]
    fn comparison_is_symmetric(a in text(), b in text()) {
        prop_assert_eq!(compare(&a, &b, NONE), compare(&b, &a, NONE));
    }

    #[test]
    fn text_matches_itself(a in text()) {
        let verdict = compare(&a, &a, NONE);
        match verdict.note {
            Some(VerdictNote::InsufficientLength) => prop_assert_eq!(verdict.score, 0.0),
            _ => prop_assert_eq!(verdict.score, 1.0),
        }
    }

    #[test]
    fn inconclusive_verdicts_always_allow(a in text(), b in text()) {
        let verdict = compare(&a, &b, NONE);
        if verdict.note.is_some() {
            prop_assert_eq!(verdict.zone, Zone::Allow);
            prop_assert_eq!(verdict.percent, 0);
        }
    }

    #[test]
    fn score_has_at_most_four_decimals(a in text(), b in text()) {
        let score = compare(&a, &b, NONE).score;
        prop_assert!(((score * 10_000.0).round() - score * 10_000.0).abs() < 1e-6);
    }
}
