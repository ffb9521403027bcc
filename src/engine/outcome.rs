use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::{fatigue::fatigue_factor, gender, pacing::base_pacing_factor, random::RandomSource, time_pressure::time_pressure_factor};
use crate::models::{Gender, PrizeType};

/// Everything the engine needs to know about the customer taking the play.
/// Mirrors the spec's `customer{firstName, totalPlays, totalWins,
/// detectedGender?}` input shape.
#[derive(Debug, Clone)]
pub struct CustomerSnapshot {
    pub first_name: String,
    pub total_plays: i64,
    pub total_wins: i64,
    pub detected_gender: Option<Gender>,
}

/// Diagnostic factors reported alongside a decision. Per spec §4.6 step 11
/// and §9, these MUST NOT feed back into any decision, and `pacing` here is
/// deliberately always `basePacing` — even when `timePressure` is the
/// signal that actually drove the outcome (an intentional, documented
/// discrepancy preserved for compatibility with existing dashboards).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionFactors {
    pub fatigue: f64,
    pub pacing: f64,
    pub time_pressure: f64,
    pub final_modifier: f64,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub winner: bool,
    pub prize_type_id: Option<Uuid>,
    pub factors: DecisionFactors,
}

/// Optional promotion-window bounds; when both are supplied, the
/// time-pressure signal (§4.5) is evaluated and, if non-neutral, replaces
/// (rather than multiplies) base pacing — see step 7 below.
#[derive(Debug, Clone, Copy)]
pub struct WindowBounds {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// The pure decision function, §4.6. `prize_types` order is preserved from
/// the caller and determines tie-break when cumulative thresholds land
/// multiple prizes on the same draw — callers must pass a stable order.
pub fn determine_outcome(
    total_tokens: i64,
    used_tokens: i64,
    prize_types: &[PrizeType],
    customer: &CustomerSnapshot,
    prizes_assigned_total: i64,
    window: Option<WindowBounds>,
    rng: &dyn RandomSource,
) -> Outcome {
    let tokens_remaining = total_tokens - used_tokens;

    let neutral_factors = DecisionFactors {
        fatigue: 1.0,
        pacing: 1.0,
        time_pressure: 1.0,
        final_modifier: 1.0,
    };

    if tokens_remaining <= 0 {
        return Outcome {
            winner: false,
            prize_type_id: None,
            factors: neutral_factors,
        };
    }

    let gender = customer
        .detected_gender
        .filter(|g| *g != Gender::Unknown)
        .unwrap_or_else(|| gender::detect_gender(&customer.first_name));

    let eligible: Vec<&PrizeType> = prize_types
        .iter()
        .filter(|p| p.remaining_stock > 0 && p.gender_restriction.admits(gender))
        .collect();

    if eligible.is_empty() {
        return Outcome {
            winner: false,
            prize_type_id: None,
            factors: neutral_factors,
        };
    }

    let fatigue = fatigue_factor(customer.total_plays, customer.total_wins);

    let prizes_initial_total: i64 = prize_types.iter().map(|p| p.initial_stock).sum();
    let base_pacing = base_pacing_factor(
        used_tokens,
        total_tokens,
        prizes_assigned_total,
        prizes_initial_total,
    );

    let time_pressure = window
        .map(|w| {
            time_pressure_factor(
                used_tokens,
                total_tokens,
                prizes_assigned_total,
                prizes_initial_total,
                w.start_time,
                w.end_time,
                w.now,
            )
        })
        .unwrap_or(1.0);

    // Step 7: time-pressure replaces (not multiplies) base pacing when it
    // is non-neutral — phases 2-4 already express conservation/distribution
    // intent that base pacing would otherwise fight.
    let pacing = if time_pressure != 1.0 {
        time_pressure
    } else {
        base_pacing
    };

    let global_modifier = fatigue * pacing;

    let mut cumulative = 0.0;
    let mut winning_prize: Option<Uuid> = None;
    let draw = rng.sample();

    for prize in &eligible {
        // Deliberately uses the whole-population `tokensRemaining`, not a
        // gender-filtered subpopulation — preserved exactly per spec §9's
        // documented "reviewable policy choice".
        let slice = (prize.remaining_stock as f64 / tokens_remaining as f64) * global_modifier;
        cumulative += slice;
        if winning_prize.is_none() && draw < cumulative {
            winning_prize = Some(prize.id);
        }
    }

    let factors = DecisionFactors {
        fatigue,
        pacing: base_pacing,
        time_pressure,
        final_modifier: global_modifier,
    };

    match winning_prize {
        Some(prize_id) => Outcome {
            winner: true,
            prize_type_id: Some(prize_id),
            factors,
        },
        None => Outcome {
            winner: false,
            prize_type_id: None,
            factors,
        },
    }
}
