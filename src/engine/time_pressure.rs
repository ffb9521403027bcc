use chrono::{DateTime, Duration, Utc};

const NORMAL_THRESHOLD: Duration = Duration::minutes(60);
const CONSERVATION_THRESHOLD: Duration = Duration::minutes(5);
const DISTRIBUTION_THRESHOLD: Duration = Duration::minutes(1);

/// Time-pressure factor, §4.5: as the promotion window closes, overrides
/// base pacing to make sure inventory lands at (or near) zero by
/// `end_time`, reserving at least one unit for the final minute.
#[allow(clippy::too_many_arguments)]
pub fn time_pressure_factor(
    used_tokens: i64,
    total_tokens: i64,
    prizes_assigned: i64,
    prizes_initial_total: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let time_elapsed = now - start_time;
    let time_remaining = end_time - now;
    let prizes_remaining = prizes_initial_total - prizes_assigned;
    let tokens_remaining = total_tokens - used_tokens;

    if prizes_remaining <= 0
        || tokens_remaining <= 0
        || time_remaining <= Duration::zero()
        || time_elapsed <= Duration::zero()
    {
        return 1.0;
    }

    let elapsed_ms = time_elapsed.num_milliseconds() as f64;
    let remaining_ms = time_remaining.num_milliseconds() as f64;

    let current_prize_rate = prizes_assigned as f64 / elapsed_ms; // units/ms
    let estimated_time_to_empty_ms = if current_prize_rate > 0.0 {
        prizes_remaining as f64 / current_prize_rate
    } else {
        f64::INFINITY
    };

    // Phase 1 — normal
    if time_remaining > NORMAL_THRESHOLD {
        return 1.0;
    }

    // Phase 2 — conservation
    if time_remaining > CONSERVATION_THRESHOLD {
        let time_until_final_ms =
            (time_remaining - CONSERVATION_THRESHOLD).num_milliseconds() as f64;

        if estimated_time_to_empty_ms < time_until_final_ms {
            let slowdown = estimated_time_to_empty_ms / time_until_final_ms;
            return slowdown.clamp(0.30, 0.80);
        }

        let margin = estimated_time_to_empty_ms / time_until_final_ms;
        return if margin > 3.0 {
            1.30
        } else if margin > 2.0 {
            1.15
        } else {
            1.0
        };
    }

    // Phase 3 — distribution
    if time_remaining > DISTRIBUTION_THRESHOLD {
        let plays_per_ms = used_tokens as f64 / elapsed_ms;
        let expected_remaining_plays = plays_per_ms * remaining_ms;

        if expected_remaining_plays <= 0.0 {
            return 5.0;
        }

        let required_win_rate = prizes_remaining as f64 / expected_remaining_plays;
        let base_win_rate = prizes_remaining as f64 / tokens_remaining as f64;

        let boost = if base_win_rate > 0.0 {
            required_win_rate / base_win_rate
        } else {
            5.0
        };

        return boost.clamp(1.5, 5.0);
    }

    // Phase 4 — final. prizes_remaining > 0 is already guaranteed by the
    // guard above, but the branch is kept explicit to mirror the spec.
    if prizes_remaining > 0 {
        10.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: DateTime<Utc>, mins: i64) -> DateTime<Utc> {
        base + Duration::minutes(mins)
    }

    #[test]
    fn guard_returns_neutral_when_prizes_exhausted() {
        let start = Utc::now();
        let end = at(start, 120);
        let now = at(start, 30);
        assert_eq!(
            time_pressure_factor(10, 100, 10, 10, start, end, now),
            1.0
        );
    }

    #[test]
    fn guard_returns_neutral_when_tokens_exhausted() {
        let start = Utc::now();
        let end = at(start, 120);
        let now = at(start, 30);
        assert_eq!(time_pressure_factor(100, 100, 1, 10, start, end, now), 1.0);
    }

    #[test]
    fn guard_returns_neutral_when_window_not_started_or_ended() {
        let start = Utc::now();
        let end = at(start, 120);
        // time_remaining <= 0
        assert_eq!(
            time_pressure_factor(10, 100, 1, 10, start, end, end),
            1.0
        );
        // time_elapsed <= 0
        assert_eq!(
            time_pressure_factor(10, 100, 1, 10, start, end, start),
            1.0
        );
    }

    #[test]
    fn phase_one_normal_outside_sixty_minutes() {
        let start = Utc::now();
        let end = at(start, 180);
        let now = at(start, 60); // 120 min remaining
        assert_eq!(time_pressure_factor(10, 100, 1, 10, start, end, now), 1.0);
    }

    #[test]
    fn phase_two_conservation_slowdown_clamped() {
        // 30 minutes remain; at current rate prizes would empty in 10
        // minutes; timeUntilFinal = 25 min; slowdown = 10/25 = 0.40.
        let start = Utc::now();
        let now = at(start, 30); // elapsed 30 min
        let end = at(now, 30); // 30 min remaining

        // prizesRemaining / currentPrizeRate == 10 minutes of elapsed-rate.
        // currentPrizeRate = prizesAssigned / elapsed. Pick prizesAssigned=3
        // over 30 min elapsed => rate = 0.1/min. prizesRemaining=1 =>
        // estimatedTimeToEmpty = 1/0.1 = 10 min.
        let factor = time_pressure_factor(50, 100, 3, 4, start, end, now);
        assert!((factor - 0.40).abs() < 1e-9, "factor={factor}");
    }

    #[test]
    fn phase_three_distribution_forces_large_boost() {
        let start = Utc::now();
        let now = at(start, 60);
        let end = at(now, 3); // 3 min remaining, phase 3

        // usedTokens=96, elapsed=60min -> playsPerMs small but nonzero.
        let factor = time_pressure_factor(96, 100, 8, 10, start, end, now);
        assert!((1.5..=5.0).contains(&factor), "factor={factor}");
    }

    #[test]
    fn phase_four_final_forces_ten_when_prizes_remain() {
        let start = Utc::now();
        let now = at(start, 119);
        let end = at(now, 0).checked_add_signed(Duration::seconds(30)).unwrap();
        let factor = time_pressure_factor(99, 100, 9, 10, start, end, now);
        assert_eq!(factor, 10.0);
    }
}
