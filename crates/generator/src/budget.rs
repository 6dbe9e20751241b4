//! Per-request generation parameters.

use catalog_core::{Mode, Tier};

/// Sampling temperature for every generation call; kept low for stable output.
pub const TEMPERATURE: f32 = 0.35;

/// Token budget for a tier and mode.
///
/// Single-field modes use small fixed budgets. Full mode scales with the
/// tier's word target plus room for markup, the short text and the meta.
pub fn max_tokens(tier: Tier, mode: Mode) -> u32 {
    match mode {
        Mode::ShortOnly => 600,
        Mode::MetaOnly => 300,
        Mode::Full => match tier {
            Tier::High => 1800,
            Tier::Mid => 1400,
            Tier::Low => 1000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budgets() {
        assert_eq!(max_tokens(Tier::High, Mode::ShortOnly), 600);
        assert_eq!(max_tokens(Tier::Low, Mode::MetaOnly), 300);
        assert_eq!(max_tokens(Tier::High, Mode::Full), 1800);
        assert_eq!(max_tokens(Tier::Mid, Mode::Full), 1400);
        assert_eq!(max_tokens(Tier::Low, Mode::Full), 1000);
    }
}
