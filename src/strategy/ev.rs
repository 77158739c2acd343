//! Expected-value calculator.
//!
//! Pure function of jackpot and game parameters. All arithmetic is done in
//! `Decimal` so EV reported to the cent and percentages to two places are
//! reproducible bit-for-bit.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::GameConfig;
use crate::types::{EngineError, EvResult};

/// Compute the EV breakdown for one ticket at `jackpot`.
///
/// ```text
/// after_tax   = jackpot × (1 − tax) × lump
/// primary_ev  = after_tax / odds
/// total_ev    = primary_ev + secondary_ev
/// net_ev      = total_ev − ticket_cost
/// ev_%        = net_ev / ticket_cost × 100
/// break_even  = (ticket_cost − secondary_ev) × odds / ((1 − tax) × lump)
/// ```
///
/// A zero jackpot is valid and simply yields a strongly negative `net_ev`.
/// Errors only surface for configs that bypassed validation.
pub fn compute_ev(jackpot: Decimal, config: &GameConfig) -> Result<EvResult, EngineError> {
    let fail = |what: &str| EngineError::Computation {
        game_id: config.id.clone(),
        context: format!(
            "{what} (jackpot={jackpot}, odds={}, ticket_cost={}, tax_rate={}, lump_sum_factor={})",
            config.odds, config.ticket_cost, config.tax_rate, config.lump_sum_factor
        ),
    };

    let odds = Decimal::from(config.odds);
    let payout_factor = (Decimal::ONE - config.tax_rate) * config.lump_sum_factor;

    let after_tax_jackpot = jackpot
        .checked_mul(payout_factor)
        .ok_or_else(|| fail("after-tax jackpot overflow"))?;
    let primary_ev = after_tax_jackpot
        .checked_div(odds)
        .ok_or_else(|| fail("odds denominator is zero"))?;

    let secondary_ev = config.secondary_prize_ev;
    let total_ev = primary_ev + secondary_ev;
    let net_ev = total_ev - config.ticket_cost;

    let ev_percentage = net_ev
        .checked_div(config.ticket_cost)
        .ok_or_else(|| fail("ticket cost is zero"))?
        * dec!(100);

    let break_even_jackpot = break_even_jackpot(config).ok_or_else(|| fail("payout factor is zero"))?;

    debug!(
        game_id = %config.id,
        jackpot = %jackpot,
        net_ev = %net_ev.round_dp(4),
        ev_pct = %ev_percentage.round_dp(2),
        "EV calculated"
    );

    Ok(EvResult {
        jackpot,
        ticket_cost: config.ticket_cost,
        after_tax_jackpot,
        primary_ev,
        secondary_ev,
        total_ev,
        net_ev,
        ev_percentage,
        break_even_jackpot,
        is_positive_ev: net_ev > Decimal::ZERO,
    })
}

/// Jackpot at which `net_ev` is exactly zero.
///
/// Clamped at zero. When `secondary_prize_ev` already covers the ticket the
/// formula goes negative and no jackpot gives `net_ev == 0`; every jackpot,
/// including zero, is then at or above break-even and `0` is reported.
pub fn break_even_jackpot(config: &GameConfig) -> Option<Decimal> {
    let payout_factor = (Decimal::ONE - config.tax_rate) * config.lump_sum_factor;
    let shortfall = config.ticket_cost - config.secondary_prize_ev;
    let jackpot = shortfall
        .checked_mul(Decimal::from(config.odds))?
        .checked_div(payout_factor)?;
    Some(jackpot.max(Decimal::ZERO))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DrawSchedule, ThresholdOperator};
    use chrono::{FixedOffset, NaiveTime, Weekday};

    fn game(odds: u64, ticket_cost: Decimal, secondary: Decimal) -> GameConfig {
        GameConfig {
            id: "test".into(),
            name: "Test".into(),
            ticket_cost,
            odds,
            secondary_prize_ev: secondary,
            tax_rate: dec!(0.37),
            lump_sum_factor: dec!(0.61),
            rollover_increment: Decimal::ZERO,
            reset_floor: None,
            threshold_operator: ThresholdOperator::AtLeast,
            min_threshold: None,
            step_increment: None,
            schedule: DrawSchedule {
                days: vec![Weekday::Mon],
                time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                utc_offset: FixedOffset::east_opt(0).unwrap(),
            },
            automation_eligible: false,
            momentum_baseline: None,
        }
    }

    #[test]
    fn test_lucky_day_scenario() {
        let cfg = game(1_221_759, dec!(1.00), dec!(0.10));
        let ev = compute_ev(dec!(350000), &cfg).unwrap();

        assert_eq!(ev.after_tax_jackpot, dec!(134505));
        assert_eq!(ev.primary_ev.round_dp(2), dec!(0.11));
        assert_eq!(ev.total_ev.round_dp(2), dec!(0.21));
        assert_eq!(ev.net_ev.round_dp(2), dec!(-0.79));
        assert_eq!(ev.ev_percentage.round_dp(2), dec!(-78.99));
        assert_eq!(ev.ev_percentage.round(), dec!(-79));
        assert!(!ev.is_positive_ev);
    }

    #[test]
    fn test_powerball_scenario() {
        let cfg = game(292_201_338, dec!(2.00), dec!(0.15));
        let ev = compute_ev(dec!(30000000), &cfg).unwrap();

        assert_eq!(ev.after_tax_jackpot, dec!(11529000));
        assert_eq!(ev.net_ev.round_dp(2), dec!(-1.81));
        assert!(!ev.is_positive_ev);
    }

    #[test]
    fn test_zero_jackpot_is_not_an_error() {
        let cfg = game(575_757, dec!(1.00), dec!(0.10));
        let ev = compute_ev(Decimal::ZERO, &cfg).unwrap();
        assert_eq!(ev.after_tax_jackpot, Decimal::ZERO);
        assert_eq!(ev.primary_ev, Decimal::ZERO);
        assert_eq!(ev.net_ev, dec!(-0.90));
        assert_eq!(ev.ev_percentage, dec!(-90));
    }

    #[test]
    fn test_deterministic() {
        let cfg = game(302_575_350, dec!(2.00), dec!(0.15));
        let a = compute_ev(dec!(285000000), &cfg).unwrap();
        let b = compute_ev(dec!(285000000), &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_break_even_round_trip() {
        for (odds, cost, secondary) in [
            (1_221_759u64, dec!(1.00), dec!(0.10)),
            (575_757, dec!(1.00), dec!(0.10)),
            (292_201_338, dec!(2.00), dec!(0.15)),
            (302_575_350, dec!(5.00), dec!(0.25)),
        ] {
            let cfg = game(odds, cost, secondary);
            let be = break_even_jackpot(&cfg).unwrap();
            let ev = compute_ev(be, &cfg).unwrap();
            assert!(ev.net_ev.abs() <= dec!(0.01), "net_ev {} at break-even", ev.net_ev);
            assert_eq!(ev.break_even_jackpot, be);
        }
    }

    #[test]
    fn test_break_even_clamped_when_secondary_covers_ticket() {
        let cfg = game(1000, dec!(1.00), dec!(1.50));
        assert_eq!(break_even_jackpot(&cfg), Some(Decimal::ZERO));

        // No root exists: even an empty jackpot is already positive
        let ev = compute_ev(Decimal::ZERO, &cfg).unwrap();
        assert_eq!(ev.net_ev, dec!(0.50));
        assert!(ev.is_positive_ev);
        assert_eq!(ev.break_even_jackpot, Decimal::ZERO);
    }

    #[test]
    fn test_monotonic_in_jackpot() {
        let cfg = game(292_201_338, dec!(2.00), dec!(0.15));
        let mut last = compute_ev(Decimal::ZERO, &cfg).unwrap().net_ev;
        for step in 1..=20 {
            let jackpot = Decimal::from(step * 50_000_000u64);
            let net = compute_ev(jackpot, &cfg).unwrap().net_ev;
            assert!(net > last);
            last = net;
        }
    }

    #[test]
    fn test_positive_ev_above_break_even() {
        let cfg = game(575_757, dec!(1.00), dec!(0.10));
        let be = break_even_jackpot(&cfg).unwrap();
        let ev = compute_ev(be + dec!(100000), &cfg).unwrap();
        assert!(ev.is_positive_ev);
        assert!(ev.ev_percentage > Decimal::ZERO);
    }

    #[test]
    fn test_zero_odds_surfaces_computation_error() {
        let cfg = game(0, dec!(1.00), dec!(0.10));
        let err = compute_ev(dec!(1000000), &cfg).unwrap_err();
        assert!(matches!(err, EngineError::Computation { .. }));
    }
}
