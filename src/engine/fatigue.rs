/// Per-customer dampening on win probability, §4.3. Pure function of the
/// customer's lifetime counters — never decreases as those counters grow.
pub fn fatigue_factor(total_plays: i64, total_wins: i64) -> f64 {
    let play_penalty = if total_plays <= 5 {
        0.0
    } else {
        let extra = (total_plays - 5) as f64;
        (0.10 + 0.02 * (extra - 1.0).max(0.0)).min(0.50)
    };

    let win_penalty = (total_wins as f64 * 0.20).min(0.60);

    let factor = (1.0 - play_penalty) * (1.0 - win_penalty);
    factor.max(0.10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_penalty_at_or_below_five_plays() {
        assert_eq!(fatigue_factor(0, 0), 1.0);
        assert_eq!(fatigue_factor(5, 0), 1.0);
    }

    #[test]
    fn play_penalty_starts_at_six_and_grows() {
        assert_eq!(fatigue_factor(6, 0), 0.90);
        assert_eq!(fatigue_factor(7, 0), 0.88);
        assert_eq!(fatigue_factor(8, 0), 0.86);
    }

    #[test]
    fn play_penalty_clamps_at_fifty_percent() {
        let factor = fatigue_factor(1000, 0);
        assert!((factor - 0.50).abs() < 1e-9);
    }

    #[test]
    fn win_penalty_clamps_at_sixty_percent() {
        // win_penalty = 0.60 at totalWins=3; play_penalty = 0 at totalPlays<=5
        assert!((fatigue_factor(0, 3) - 0.40).abs() < 1e-9);
        assert!((fatigue_factor(0, 10) - 0.40).abs() < 1e-9);
    }

    #[test]
    fn floor_is_ten_percent() {
        assert!((fatigue_factor(1000, 1000) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn monotonic_non_increasing_in_plays_and_wins() {
        let mut prev = fatigue_factor(0, 0);
        for plays in 1..60 {
            let cur = fatigue_factor(plays, 0);
            assert!(cur <= prev + 1e-12, "plays={plays} prev={prev} cur={cur}");
            prev = cur;
        }

        let mut prev = fatigue_factor(0, 0);
        for wins in 1..10 {
            let cur = fatigue_factor(0, wins);
            assert!(cur <= prev + 1e-12, "wins={wins} prev={prev} cur={cur}");
            prev = cur;
        }
    }
}
