//! Buy-signal classifier.
//!
//! Combines the EV result with rollover momentum and short-term growth into
//! a composite score in [0, 1]:
//!
//! ```text
//! score = 0.6 × ev_score + 0.3 × momentum_score + 0.1 × growth_score
//! ```
//!
//! `ev_score` is `clamp((ev_percentage + 100) / 100, 0, 1)`, so the tier
//! boundaries at −20% and −40% map to 0.8 and 0.6.
//!
//! Momentum compares the current rollover count with the p75/p95 of the
//! lengths of the game's completed cycles. The buy gate is kept
//! separate: the class is informational tiering, the gate decides whether a
//! buy notification is due.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::{GameConfig, MomentumBaseline, SignalConfig};
use crate::types::{
    EngineError, EvResult, EvTier, GameState, GrowthClass, JackpotPoint, MomentumClass,
    SignalClass, SignalResult,
};

const EV_WEIGHT: Decimal = dec!(0.6);
const MOMENTUM_WEIGHT: Decimal = dec!(0.3);
const GROWTH_WEIGHT: Decimal = dec!(0.1);

// ---------------------------------------------------------------------------
// Component scores
// ---------------------------------------------------------------------------

pub fn ev_tier(ev_percentage: Decimal) -> EvTier {
    if ev_percentage > dec!(-20) {
        EvTier::ValueOpportunity
    } else if ev_percentage >= dec!(-40) {
        EvTier::Watchlist
    } else {
        EvTier::NotRecommended
    }
}

pub fn ev_score(ev_percentage: Decimal) -> Decimal {
    ((ev_percentage + dec!(100)) / dec!(100)).clamp(Decimal::ZERO, Decimal::ONE)
}

pub fn momentum(rollover_count: u32, baseline: MomentumBaseline) -> (MomentumClass, Decimal) {
    if rollover_count >= baseline.p95 {
        (MomentumClass::Strong, dec!(1.0))
    } else if rollover_count >= baseline.p75 {
        (MomentumClass::Moderate, dec!(0.6))
    } else {
        (MomentumClass::Weak, dec!(0.2))
    }
}

/// Percent change between the two latest history points.
pub fn growth_pct(history: &[JackpotPoint]) -> Option<Decimal> {
    let [.., prev, last] = history else {
        return None;
    };
    if prev.jackpot <= Decimal::ZERO {
        return None;
    }
    Some((last.jackpot - prev.jackpot) / prev.jackpot * dec!(100))
}

pub fn growth(pct: Option<Decimal>, config: &SignalConfig) -> (GrowthClass, Decimal) {
    match pct {
        Some(p) if p >= config.growth_strong_pct => (GrowthClass::Strong, dec!(1.0)),
        Some(p) if p >= config.growth_moderate_pct => (GrowthClass::Moderate, dec!(0.6)),
        Some(p) if p > Decimal::ZERO => (GrowthClass::Weak, dec!(0.2)),
        _ => (GrowthClass::None, Decimal::ZERO),
    }
}

pub fn composite(ev_score: Decimal, momentum_score: Decimal, growth_score: Decimal) -> Decimal {
    (EV_WEIGHT * ev_score + MOMENTUM_WEIGHT * momentum_score + GROWTH_WEIGHT * growth_score)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

pub fn signal_class(score: Decimal) -> SignalClass {
    if score >= dec!(0.8) {
        SignalClass::StrongOpportunity
    } else if score >= dec!(0.6) {
        SignalClass::ModerateOpportunity
    } else if score >= dec!(0.4) {
        SignalClass::Watchlist
    } else {
        SignalClass::Skip
    }
}

/// Binary notify decision: near break-even or better.
pub fn passes_buy_gate(net_ev: Decimal, ev_threshold: Decimal) -> bool {
    net_ev >= ev_threshold || net_ev > Decimal::ZERO
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[u32], p: usize) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct SignalClassifier {
    config: SignalConfig,
}

impl SignalClassifier {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Rollover percentiles for the game: from the lengths of its completed
    /// cycles once enough have been seen, otherwise the configured baseline.
    pub fn momentum_baseline(&self, state: &GameState, game: &GameConfig) -> MomentumBaseline {
        let fallback = game.momentum_baseline.unwrap_or(self.config.momentum_baseline);
        let cycles = &state.completed_cycles;
        if cycles.len() < self.config.min_completed_cycles.max(1) || cycles.iter().all(|c| *c == 0) {
            return fallback;
        }
        let mut sorted = cycles.clone();
        sorted.sort_unstable();
        MomentumBaseline {
            p75: percentile(&sorted, 75),
            p95: percentile(&sorted, 95),
        }
    }

    pub fn classify(
        &self,
        ev: &EvResult,
        state: &GameState,
        game: &GameConfig,
    ) -> Result<SignalResult, EngineError> {
        validate_history(&state.jackpot_history, &game.id)?;

        let ev_tier = ev_tier(ev.ev_percentage);
        let ev_score = ev_score(ev.ev_percentage);

        let baseline = self.momentum_baseline(state, game);
        let (momentum_class, momentum_score) = momentum(state.rollover_count, baseline);

        let growth_pct = growth_pct(&state.jackpot_history);
        let (growth_class, growth_score) = growth(growth_pct, &self.config);

        let composite_score = composite(ev_score, momentum_score, growth_score);
        let signal_class = signal_class(composite_score);

        debug!(
            game_id = %game.id,
            ev_tier = %ev_tier,
            momentum = %momentum_class,
            p75 = baseline.p75,
            p95 = baseline.p95,
            growth = %growth_class,
            score = %composite_score.round_dp(3),
            class = %signal_class,
            "Signal classified"
        );

        Ok(SignalResult {
            ev_tier,
            ev_score,
            momentum_class,
            momentum_score,
            growth_class,
            growth_score,
            growth_pct,
            composite_score,
            signal_class,
        })
    }
}

fn validate_history(history: &[JackpotPoint], game_id: &str) -> Result<(), EngineError> {
    if let Some(p) = history.iter().find(|p| p.jackpot < Decimal::ZERO) {
        return Err(EngineError::Computation {
            game_id: game_id.to_string(),
            context: format!("negative jackpot {} in history at {}", p.jackpot, p.timestamp),
        });
    }
    if let Some(w) = history.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
        return Err(EngineError::Computation {
            game_id: game_id.to_string(),
            context: format!(
                "history out of order: {} follows {}",
                w[1].timestamp, w[0].timestamp
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DrawSchedule, ThresholdOperator};
    use crate::strategy::ev::compute_ev;
    use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};

    fn game() -> GameConfig {
        GameConfig {
            id: "mega_millions".into(),
            name: "Mega Millions".into(),
            ticket_cost: dec!(5),
            odds: 290_472_336,
            secondary_prize_ev: dec!(0.25),
            tax_rate: dec!(0.37),
            lump_sum_factor: dec!(0.61),
            rollover_increment: dec!(2000000),
            reset_floor: Some(dec!(100000000)),
            threshold_operator: ThresholdOperator::AtLeast,
            min_threshold: None,
            step_increment: None,
            schedule: DrawSchedule {
                days: vec![Weekday::Tue, Weekday::Fri],
                time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
                utc_offset: FixedOffset::east_opt(0).unwrap(),
            },
            automation_eligible: true,
            momentum_baseline: None,
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap()
    }

    fn history(jackpots_m: &[u64]) -> Vec<JackpotPoint> {
        jackpots_m
            .iter()
            .enumerate()
            .map(|(i, m)| JackpotPoint {
                timestamp: ts(i as u32 + 1),
                jackpot: Decimal::from(m * 1_000_000),
            })
            .collect()
    }

    fn classifier() -> SignalClassifier {
        SignalClassifier::new(SignalConfig::default())
    }

    #[test]
    fn test_ev_tier_boundaries() {
        assert_eq!(ev_tier(dec!(-19.99)), EvTier::ValueOpportunity);
        assert_eq!(ev_tier(dec!(-20)), EvTier::Watchlist);
        assert_eq!(ev_tier(dec!(-40)), EvTier::Watchlist);
        assert_eq!(ev_tier(dec!(-40.01)), EvTier::NotRecommended);
        assert_eq!(ev_tier(dec!(12)), EvTier::ValueOpportunity);
    }

    #[test]
    fn test_ev_score_mapping() {
        assert_eq!(ev_score(dec!(-20)), dec!(0.8));
        assert_eq!(ev_score(dec!(-40)), dec!(0.6));
        assert_eq!(ev_score(dec!(-100)), Decimal::ZERO);
        assert_eq!(ev_score(dec!(-150)), Decimal::ZERO);
        assert_eq!(ev_score(dec!(35)), Decimal::ONE);
    }

    #[test]
    fn test_signal_class_boundaries() {
        assert_eq!(signal_class(dec!(0.8)), SignalClass::StrongOpportunity);
        assert_eq!(signal_class(dec!(0.79999)), SignalClass::ModerateOpportunity);
        assert_eq!(signal_class(dec!(0.6)), SignalClass::ModerateOpportunity);
        assert_eq!(signal_class(dec!(0.59999)), SignalClass::Watchlist);
        assert_eq!(signal_class(dec!(0.4)), SignalClass::Watchlist);
        assert_eq!(signal_class(dec!(0.39999)), SignalClass::Skip);
    }

    #[test]
    fn test_composite_weights_and_range() {
        assert_eq!(composite(Decimal::ONE, Decimal::ONE, Decimal::ONE), Decimal::ONE);
        assert_eq!(composite(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(composite(dec!(0.8), dec!(0.6), dec!(0.2)), dec!(0.68));
        for ev in [dec!(0), dec!(0.37), dec!(1)] {
            for m in [dec!(0.2), dec!(0.6), dec!(1.0)] {
                for g in [dec!(0), dec!(0.2), dec!(0.6), dec!(1.0)] {
                    let s = composite(ev, m, g);
                    assert!(s >= Decimal::ZERO && s <= Decimal::ONE);
                }
            }
        }
    }

    #[test]
    fn test_buy_gate() {
        // Near break-even passes even though EV is negative
        assert!(passes_buy_gate(dec!(-0.15), dec!(-0.20)));
        assert!(passes_buy_gate(dec!(-0.20), dec!(-0.20)));
        assert!(!passes_buy_gate(dec!(-0.21), dec!(-0.20)));
        // Positive EV always passes
        assert!(passes_buy_gate(dec!(0.01), dec!(0.50)));
        assert!(!passes_buy_gate(Decimal::ZERO, dec!(0.50)));
    }

    #[test]
    fn test_momentum_uses_baseline_with_thin_history() {
        let mut state = GameState::new("mega_millions");
        state.jackpot_history = history(&[20, 22, 24]);

        let baseline = classifier().momentum_baseline(&state, &game());
        assert_eq!(baseline, MomentumBaseline::default());

        assert_eq!(momentum(25, baseline).0, MomentumClass::Strong);
        assert_eq!(momentum(20, baseline).0, MomentumClass::Strong);
        assert_eq!(momentum(12, baseline).0, MomentumClass::Moderate);
        assert_eq!(momentum(3, baseline), (MomentumClass::Weak, dec!(0.2)));
    }

    #[test]
    fn test_game_baseline_overrides_default() {
        let mut cfg = game();
        cfg.momentum_baseline = Some(MomentumBaseline { p75: 4, p95: 6 });
        let state = GameState::new("mega_millions");
        assert_eq!(
            classifier().momentum_baseline(&state, &cfg),
            MomentumBaseline { p75: 4, p95: 6 }
        );
    }

    #[test]
    fn test_momentum_percentiles_from_completed_cycles() {
        let mut state = GameState::new("mega_millions");
        state.completed_cycles = vec![30, 12, 25, 8, 40, 18, 22, 35, 15, 28];

        let baseline = classifier().momentum_baseline(&state, &game());
        // Sorted: 8 12 15 18 22 25 28 30 35 40
        assert_eq!(baseline, MomentumBaseline { p75: 30, p95: 40 });
    }

    #[test]
    fn test_few_or_empty_cycles_fall_back_to_baseline() {
        let mut state = GameState::new("mega_millions");
        state.completed_cycles = vec![30, 40, 50, 60];
        assert_eq!(
            classifier().momentum_baseline(&state, &game()),
            MomentumBaseline::default()
        );

        state.completed_cycles = vec![0; 8];
        assert_eq!(
            classifier().momentum_baseline(&state, &game()),
            MomentumBaseline::default()
        );
    }

    #[test]
    fn test_long_history_in_one_cycle_does_not_inflate_momentum() {
        let cfg = game();
        let mut state = GameState::new("mega_millions");
        // Twelve readings, one cycle, one rollover so far
        state.jackpot_history = history(&[40, 40, 40, 40, 40, 40, 40, 41, 41, 41, 42, 42]);
        state.rollover_count = 1;
        state.last_jackpot = dec!(42000000);

        let ev = compute_ev(state.last_jackpot, &cfg).unwrap();
        let signal = classifier().classify(&ev, &state, &cfg).unwrap();
        assert_eq!(signal.momentum_class, MomentumClass::Weak);
        assert_eq!(signal.momentum_score, dec!(0.2));
    }

    #[test]
    fn test_growth_classes() {
        let cfg = SignalConfig::default();
        let class = |h: &[u64]| growth(growth_pct(&history(h)), &cfg).0;
        assert_eq!(class(&[20, 23]), GrowthClass::Strong);
        assert_eq!(class(&[20, 21]), GrowthClass::Moderate);
        assert_eq!(class(&[200, 201]), GrowthClass::Weak);
        assert_eq!(class(&[20, 19]), GrowthClass::None);
        assert_eq!(class(&[20]), GrowthClass::None);
        assert_eq!(class(&[0, 5]), GrowthClass::None);
        assert_eq!(growth_pct(&history(&[20, 23])), Some(dec!(15)));
    }

    #[test]
    fn test_classify_end_to_end() {
        let cfg = game();
        let mut state = GameState::new("mega_millions");
        state.jackpot_history = history(&[400, 460]);
        state.rollover_count = 30;
        state.last_jackpot = dec!(460000000);

        let ev = compute_ev(state.last_jackpot, &cfg).unwrap();
        let signal = classifier().classify(&ev, &state, &cfg).unwrap();

        assert_eq!(signal.momentum_class, MomentumClass::Strong);
        assert_eq!(signal.growth_class, GrowthClass::Strong);
        assert_eq!(signal.ev_score, ev_score(ev.ev_percentage));
        assert_eq!(
            signal.composite_score,
            composite(signal.ev_score, dec!(1.0), dec!(1.0))
        );
        assert_eq!(signal.signal_class, signal_class(signal.composite_score));
    }

    #[test]
    fn test_malformed_history_is_a_computation_error() {
        let cfg = game();
        let mut state = GameState::new("mega_millions");
        let mut h = history(&[20, 22]);
        h.swap(0, 1);
        state.jackpot_history = h;

        let ev = compute_ev(dec!(22000000), &cfg).unwrap();
        let err = classifier().classify(&ev, &state, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::Computation { .. }));

        state.jackpot_history = history(&[20]);
        state.jackpot_history[0].jackpot = dec!(-1);
        assert!(classifier().classify(&ev, &state, &cfg).is_err());
    }
}
