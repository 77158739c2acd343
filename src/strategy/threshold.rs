//! Stepped threshold evaluator.
//!
//! Levels are `min, min + step, min + 2×step, ...`. Each level alerts at
//! most once per alert scope; an observation that skips several levels
//! marks them all but yields a single event for the highest one. At most
//! [`MAX_LEVELS_RECORDED`] levels are written per observation; the event
//! still reports the full count.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{GameConfig, ThresholdOperator};
use crate::types::{GameState, ThresholdEvent, ThresholdHit};

/// Audit entries written for a single observation, highest levels first.
pub const MAX_LEVELS_RECORDED: u64 = 64;

/// Index of the highest ladder level `jackpot` passes under `operator`, or
/// `None` when it is below the first level.
fn top_level_index(
    jackpot: Decimal,
    min: Decimal,
    step: Option<Decimal>,
    operator: ThresholdOperator,
) -> Option<u64> {
    if !operator.crosses(jackpot, min) {
        return None;
    }
    let Some(step) = step else {
        return Some(0);
    };
    let mut k = jackpot
        .checked_sub(min)?
        .checked_div(step)?
        .floor()
        .to_u64()?;
    // `>` must strictly exceed; an exact landing on a level belongs to the one below
    if operator == ThresholdOperator::Above && level(min, Some(step), k) == jackpot {
        k = k.checked_sub(1)?;
    }
    Some(k)
}

/// Ladder level `k`. Saturates at `Decimal::MAX`.
fn level(min: Decimal, step: Option<Decimal>, k: u64) -> Decimal {
    match step {
        Some(step) => step
            .checked_mul(Decimal::from(k))
            .and_then(|offset| min.checked_add(offset))
            .unwrap_or(Decimal::MAX),
        None => min,
    }
}

/// First ladder index strictly above `hit`.
fn next_index_above(hit: Decimal, min: Decimal, step: Option<Decimal>) -> u64 {
    if hit < min {
        return 0;
    }
    match step {
        Some(step) => (hit - min)
            .checked_div(step)
            .and_then(|n| n.floor().to_u64())
            .map_or(u64::MAX, |k| k.saturating_add(1)),
        None => 1,
    }
}

/// Check `jackpot` against the game's ladder and record any newly reached
/// levels in `state`.
///
/// Returns `None` when thresholds are disabled (no `min_threshold`), when
/// the jackpot is below the first level, or when every level it reaches was
/// already alerted in the current scope.
pub fn check_threshold(
    state: &mut GameState,
    jackpot: Decimal,
    timestamp: DateTime<Utc>,
    config: &GameConfig,
) -> Option<ThresholdEvent> {
    let min = config.min_threshold?;
    let step = config.step_increment;

    let top = top_level_index(jackpot, min, step, config.threshold_operator)?;
    let top_value = level(min, step, top);

    let start = match state.highest_hit_in_scope() {
        Some(hit) if hit >= top_value => {
            debug!(
                game_id = %config.id,
                jackpot = %jackpot,
                highest_hit = %hit,
                "Threshold already alerted this cycle"
            );
            return None;
        }
        Some(hit) => next_index_above(hit, min, step),
        None => 0,
    };

    let span = top - start.min(top) + 1;
    let crossed = usize::try_from(span).unwrap_or(usize::MAX);
    let first_recorded = top - (span.min(MAX_LEVELS_RECORDED) - 1);
    if span > MAX_LEVELS_RECORDED {
        warn!(
            game_id = %config.id,
            jackpot = %jackpot,
            levels = span,
            recorded = MAX_LEVELS_RECORDED,
            "Jackpot crossed more levels than are recorded per observation"
        );
    }
    for k in first_recorded..=top {
        state.thresholds_hit.push(ThresholdHit {
            threshold: level(min, step, k),
            jackpot,
            timestamp,
        });
    }
    state.last_threshold_hit = Some(top_value);
    state.last_alert_time = Some(timestamp);

    info!(
        game_id = %config.id,
        threshold = %top_value,
        jackpot = %jackpot,
        levels = crossed,
        "Threshold crossed"
    );

    Some(ThresholdEvent {
        game_id: config.id.clone(),
        threshold: top_value,
        jackpot,
        previous_jackpot: state.previous_jackpot,
        timestamp,
        levels_crossed: crossed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
