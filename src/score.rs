//! Composite opportunity score blending volume, competition, CPC and
//! SERP difficulty into a single comparable integer.

/// Compute the opportunity score for one keyword.
///
/// Pure and deterministic: identical inputs always produce the same
/// integer, so the score can be recomputed once SERP data arrives
/// without drift. Zero volume always scores zero.
pub fn opportunity_score(
    volume: u64,
    competition: f64,
    cpc: f64,
    serp_difficulty: Option<u8>,
) -> i64 {
    if volume == 0 {
        return 0;
    }

    let volume_score = (volume as f64 / 1000.0).min(10.0);
    let comp_score = 1.0 - competition.clamp(0.0, 1.0);
    let cpc_bonus = (cpc.max(0.0) / 5.0).min(1.0);

    let mut base = volume_score * comp_score * 80.0 + cpc_bonus * 20.0;

    if let Some(serp) = serp_difficulty {
        let serp_bonus = (100.0 - serp.min(100) as f64) / 100.0;
        base = base * 0.6 + base * serp_bonus * 0.4;
    }

    base.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_volume_scores_zero() {
        assert_eq!(opportunity_score(0, 0.0, 0.0, None), 0);
        assert_eq!(opportunity_score(0, 0.9, 12.0, Some(5)), 0);
        assert_eq!(opportunity_score(0, 0.1, 0.5, Some(99)), 0);
    }

    #[test]
    fn test_worked_example_without_serp() {
        // volume_score=5, comp_score=0.7, cpc_bonus=0.4
        // base = 5*0.7*80 + 0.4*20 = 280 + 8 = 288
        assert_eq!(opportunity_score(5000, 0.3, 2.0, None), 288);
    }

    #[test]
    fn test_worked_example_with_serp() {
        // serp_bonus = 0.6; base = 288*0.6 + 288*0.6*0.4 = 241.92 -> 242
        assert_eq!(opportunity_score(5000, 0.3, 2.0, Some(40)), 242);
    }

    #[test]
    fn test_determinism() {
        let first = opportunity_score(12345, 0.47, 1.3, Some(33));
        for _ in 0..100 {
            assert_eq!(opportunity_score(12345, 0.47, 1.3, Some(33)), first);
        }
    }

    #[test]
    fn test_monotonic_in_volume() {
        let mut prev = opportunity_score(1, 0.4, 1.0, Some(50));
        for volume in [10, 100, 500, 1000, 5000, 10_000, 50_000] {
            let next = opportunity_score(volume, 0.4, 1.0, Some(50));
            assert!(next >= prev, "score decreased at volume={}", volume);
            prev = next;
        }
    }

    #[test]
    fn test_non_increasing_in_competition() {
        let mut prev = opportunity_score(5000, 0.0, 1.0, None);
        for comp in [0.1, 0.25, 0.5, 0.75, 0.9, 1.0] {
            let next = opportunity_score(5000, comp, 1.0, None);
            assert!(next <= prev, "score increased at competition={}", comp);
            prev = next;
        }
    }

    #[test]
    fn test_volume_score_caps_at_ten() {
        // Both well past the 10k cap, so only the cpc term could differ
        assert_eq!(
            opportunity_score(50_000, 0.5, 1.0, None),
            opportunity_score(500_000, 0.5, 1.0, None)
        );
    }

    #[test]
    fn test_cpc_bonus_caps_at_one() {
        assert_eq!(
            opportunity_score(2000, 0.5, 5.0, None),
            opportunity_score(2000, 0.5, 50.0, None)
        );
    }

    #[test]
    fn test_easier_serp_scores_higher() {
        let easy = opportunity_score(5000, 0.3, 2.0, Some(10));
        let hard = opportunity_score(5000, 0.3, 2.0, Some(90));
        assert!(easy > hard);
    }
}
