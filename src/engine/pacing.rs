/// Base pacing factor, §4.4: keeps the prize-award rate aligned with the
/// token-consumption rate, independent of the clock.
pub fn base_pacing_factor(
    used_tokens: i64,
    total_tokens: i64,
    prizes_assigned: i64,
    prizes_initial_total: i64,
) -> f64 {
    if total_tokens == 0 || prizes_initial_total == 0 || used_tokens == 0 {
        return 1.0;
    }

    let token_progress = used_tokens as f64 / total_tokens as f64;
    let prize_progress = prizes_assigned as f64 / prizes_initial_total as f64;

    if token_progress == 0.0 {
        return 1.0;
    }

    let ratio = prize_progress / token_progress;

    if ratio > 1.30 {
        0.60
    } else if ratio > 1.15 {
        0.80
    } else if ratio < 0.70 {
        1.40
    } else if ratio < 0.85 {
        1.20
    } else {
        1.0
    }
}
