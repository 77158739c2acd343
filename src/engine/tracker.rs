//! Rollover / state tracker.
//!
//! Folds one observation into a game's state: appends to the retained
//! history, detects cycle resets (a jackpot win) and keeps the rollover
//! count for the current cycle. Never emits alerts itself.

use chrono::Duration;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, GameConfig};
use crate::types::{Anomaly, EngineError, GameState, JackpotPoint, Observation};

// ---------------------------------------------------------------------------
// Tracker output
// ---------------------------------------------------------------------------

/// What the tracker did with an observation, besides updating state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerUpdate {
    /// A new cycle started with this observation.
    pub cycle_reset: bool,
    /// First observation ever recorded for the game.
    pub first_observation: bool,
    /// Non-fatal anomaly (rollover regression). The observation was still
    /// recorded but the rollover count kept its prior value.
    pub anomaly: Option<Anomaly>,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Completed-cycle lengths kept per game for momentum percentiles.
pub const MAX_COMPLETED_CYCLES: usize = 100;

pub struct StateTracker {
    retention: Duration,
    max_jump_factor: Decimal,
    max_jackpot: Decimal,
}

impl StateTracker {
    pub fn new(retention_days: i64, max_jump_factor: Decimal) -> Self {
        Self {
            retention: Duration::days(retention_days.max(1)),
            max_jump_factor,
            max_jackpot: EngineConfig::default().max_jackpot,
        }
    }

    pub fn with_max_jackpot(mut self, max_jackpot: Decimal) -> Self {
        self.max_jackpot = max_jackpot;
        self
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.history_retention_days, config.max_jump_factor)
            .with_max_jackpot(config.max_jackpot)
    }

    /// Fold `obs` into a copy of `state`.
    ///
    /// Implausible readings (negative, above `max_jackpot`, out of order, or
    /// a jump beyond `max_jump_factor` without a reset signature) are
    /// rejected and the
    /// input state is left as it was.
    pub fn update(
        &self,
        state: &GameState,
        obs: &Observation,
        config: &GameConfig,
    ) -> Result<(GameState, TrackerUpdate), EngineError> {
        self.check_plausible(state, obs)?;

        let mut next = state.clone();
        let jackpot = obs.jackpot;
        let first_observation = state.cycle_start_jackpot.is_none();
        let mut cycle_reset = false;
        let mut anomaly = None;

        if first_observation {
            next.cycle_start_jackpot = Some(jackpot);
            next.cycle_started_at = Some(obs.timestamp);
            next.rollover_count = 0;
            info!(
                game_id = %config.id,
                jackpot = %jackpot,
                "Initialised cycle start jackpot"
            );
        } else if is_cycle_reset(state.last_jackpot, jackpot, config) {
            cycle_reset = true;
            next.completed_cycles.push(state.rollover_count);
            let excess = next.completed_cycles.len().saturating_sub(MAX_COMPLETED_CYCLES);
            next.completed_cycles.drain(..excess);
            next.cycle_start_jackpot = Some(jackpot);
            next.cycle_started_at = Some(obs.timestamp);
            next.rollover_count = 0;
            next.open_alert_scope();
            info!(
                game_id = %config.id,
                previous = %state.last_jackpot,
                jackpot = %jackpot,
                "Jackpot reset detected, new cycle started"
            );
        } else {
            let start = state.cycle_start_jackpot.unwrap_or(jackpot);
            let computed = rollovers_between(start, jackpot, config.rollover_increment);
            if computed < state.rollover_count {
                warn!(
                    game_id = %config.id,
                    previous = state.rollover_count,
                    computed,
                    jackpot = %jackpot,
                    "Rollover count would regress, keeping prior value"
                );
                anomaly = Some(Anomaly::RolloverRegression {
                    previous: state.rollover_count,
                    computed,
                });
            } else {
                if computed > state.rollover_count {
                    debug!(
                        game_id = %config.id,
                        rollovers = computed,
                        cycle_start = %start,
                        jackpot = %jackpot,
                        "Rollover count advanced"
                    );
                }
                next.rollover_count = computed;
            }
        }

        if !first_observation && state.last_jackpot != jackpot {
            next.previous_jackpot = Some(state.last_jackpot);
        }
        next.last_jackpot = jackpot;

        next.jackpot_history.push(JackpotPoint {
            timestamp: obs.timestamp,
            jackpot,
        });
        let cutoff = obs.timestamp - self.retention;
        next.jackpot_history.retain(|p| p.timestamp >= cutoff);
        next.updated_at = Some(obs.timestamp);

        Ok((
            next,
            TrackerUpdate {
                cycle_reset,
                first_observation,
                anomaly,
            },
        ))
    }

    fn check_plausible(&self, state: &GameState, obs: &Observation) -> Result<(), EngineError> {
        let reject = |anomaly| EngineError::DataAnomaly {
            game_id: obs.game_id.clone(),
            anomaly,
        };

        if obs.jackpot < Decimal::ZERO {
            return Err(reject(Anomaly::NegativeJackpot { jackpot: obs.jackpot }));
        }
        if obs.jackpot > self.max_jackpot {
            return Err(reject(Anomaly::OutOfRange {
                jackpot: obs.jackpot,
                max: self.max_jackpot,
            }));
        }
        if let Some(last) = state.last_observed_at() {
            if obs.timestamp < last {
                return Err(reject(Anomaly::OutOfOrder {
                    last,
                    observed: obs.timestamp,
                }));
            }
        }
        let previous = state.last_jackpot;
        let ceiling = previous.checked_mul(self.max_jump_factor);
        if !state.is_fresh()
            && previous > Decimal::ZERO
            && ceiling.map_or(true, |c| obs.jackpot > c)
        {
            return Err(reject(Anomaly::ImplausibleJump {
                previous,
                jackpot: obs.jackpot,
            }));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cycle arithmetic
// ---------------------------------------------------------------------------

/// A drop to under half the previous jackpot starts a new cycle. Games with
/// a `reset_floor` additionally require the new value to be under the floor,
/// so ordinary noise at the top of a large cycle is not mistaken for a win.
pub fn is_cycle_reset(previous: Decimal, current: Decimal, config: &GameConfig) -> bool {
    if previous <= Decimal::ZERO || current >= previous * dec!(0.5) {
        return false;
    }
    match config.reset_floor {
        Some(floor) => current < floor,
        None => true,
    }
}

/// `floor((jackpot − cycle_start) / increment)`, clamped at zero. A zero
/// increment disables rollover counting.
pub fn rollovers_between(cycle_start: Decimal, jackpot: Decimal, increment: Decimal) -> u32 {
    if increment <= Decimal::ZERO || jackpot <= cycle_start {
        return 0;
    }
    jackpot
        .checked_sub(cycle_start)
        .and_then(|gain| gain.checked_div(increment))
        .and_then(|n| n.floor().to_u32())
        .unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
