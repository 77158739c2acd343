//! Worked examples replayed through config → engine → outcome.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

use jackpot_watch::config::AppConfig;
use jackpot_watch::engine::Engine;
use jackpot_watch::storage::MemoryStore;
use jackpot_watch::strategy::ev::compute_ev;
use jackpot_watch::strategy::{DecisionPhase, NotifyMode};
use jackpot_watch::types::{EngineError, NotificationKind, Observation, SignalClass};

const CONFIG: &str = r#"
    [engine]
    ev_threshold = -0.20

    [ev]
    tax_rate = 0.37
    lump_sum_factor = 0.61

    [games.powerball]
    name = "Powerball"
    ticket_cost = 2.0
    odds = 292201338
    secondary_prize_ev = 0.15
    rollover_increment = 2000000
    reset_floor = 100000000
    min_threshold = 100000000
    step_increment = 50000000
    draw_days = ["Mon", "Wed", "Sat"]
    draw_time = "21:59"
    utc_offset_minutes = -300

    [games.lucky_day]
    name = "Lucky Day Lotto"
    ticket_cost = 1.0
    odds = 1221759
    secondary_prize_ev = 0.10
    rollover_increment = 50000
    reset_floor = 100000
    min_threshold = 500000
    step_increment = 50000
    draw_days = ["daily"]
    draw_time = "21:22"
    utc_offset_minutes = -360

    [games.pick]
    name = "Pick"
    ticket_cost = 1.0
    odds = 1000
    secondary_prize_ev = 0.10
    tax_rate = 0.0
    lump_sum_factor = 1.0
    min_threshold = 700
    step_increment = 100
    automation_eligible = true
    draw_days = ["Mon"]
    draw_time = "22:00"
"#;

// ---- helpers ----

fn engine() -> Engine {
    let config = AppConfig::from_toml_str(CONFIG).unwrap();
    Engine::new(&config, Arc::new(MemoryStore::new()))
}

fn t(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
}

fn kinds(outcome: &jackpot_watch::strategy::DecisionOutcome) -> Vec<NotificationKind> {
    outcome.notifications.iter().map(|n| n.kind).collect()
}

// ---- EV ----

#[test]
fn test_lucky_day_ev_figures() {
    let engine = engine();
    let ev = compute_ev(dec!(350000), engine.game("lucky_day").unwrap()).unwrap();
    assert_eq!(ev.after_tax_jackpot, dec!(134505));
    assert_eq!(ev.primary_ev.round_dp(2), dec!(0.11));
    assert_eq!(ev.total_ev.round_dp(2), dec!(0.21));
    assert_eq!(ev.net_ev.round_dp(2), dec!(-0.79));
    assert_eq!(ev.ev_percentage.round_dp(0), dec!(-79));
    assert!(!ev.is_positive_ev);
}

#[test]
fn test_powerball_ev_figures() {
    let engine = engine();
    let ev = compute_ev(dec!(30000000), engine.game("powerball").unwrap()).unwrap();
    assert_eq!(ev.net_ev.round_dp(2), dec!(-1.81));
}

// ---- thresholds ----

#[tokio::test]
async fn test_threshold_ladder_alerts_once_per_level() {
    let engine = engine();
    let mut events = Vec::new();
    for (i, jackpot) in [dec!(480000), dec!(500000), dec!(510000)].into_iter().enumerate() {
        let ts = t(2, 10, i as u32);
        let outcome = engine
            .process(&Observation::new("lucky_day", ts, jackpot), NotifyMode::Manual, ts)
            .await
            .unwrap();
        events.push(outcome.threshold.map(|e| e.threshold));
    }
    assert_eq!(events, vec![None, Some(dec!(500000)), None]);

    let history = engine.alert_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].threshold, dec!(500000));
}

// ---- rollovers and cycles ----

#[tokio::test]
async fn test_rollover_count_from_cycle_start() {
    let engine = engine();
    engine
        .set_rollover("powerball", 0, Some(dec!(157000000)), t(2, 9, 0))
        .await
        .unwrap();

    let ts = t(2, 10, 0);
    let outcome = engine
        .process(&Observation::new("powerball", ts, dec!(285000000)), NotifyMode::Manual, ts)
        .await
        .unwrap();
    assert_eq!(outcome.state.rollover_count, 64);
    assert!(!outcome.cycle_reset);
}

#[tokio::test]
async fn test_jackpot_won_starts_new_cycle() {
    let engine = engine();
    let first = t(2, 10, 0);
    let before = engine
        .process(&Observation::new("powerball", first, dec!(300000000)), NotifyMode::Manual, first)
        .await
        .unwrap();
    assert_eq!(before.threshold.unwrap().threshold, dec!(300000000));

    let second = t(3, 10, 0);
    let outcome = engine
        .process(&Observation::new("powerball", second, dec!(20000000)), NotifyMode::Manual, second)
        .await
        .unwrap();

    assert!(outcome.cycle_reset);
    assert_eq!(outcome.state.rollover_count, 0);
    assert_eq!(outcome.state.cycle_start_jackpot, Some(dec!(20000000)));
    assert!(outcome.state.hits_in_scope().is_empty());
    // Audit list survives the new cycle
    assert_eq!(outcome.state.thresholds_hit.len(), 5);
    assert!(outcome.threshold.is_none());
}

// ---- buy signal ----

#[tokio::test]
async fn test_near_break_even_fires_buy_signal() {
    let engine = engine();
    let ts = t(2, 10, 0);
    let outcome = engine
        .process(&Observation::new("pick", ts, dec!(750)), NotifyMode::Manual, ts)
        .await
        .unwrap();

    assert_eq!(outcome.ev.net_ev, dec!(-0.15));
    assert!(!outcome.ev.is_positive_ev);
    assert!(outcome.buy_signal);
    assert_eq!(outcome.phase, DecisionPhase::Notified);
    assert_eq!(
        kinds(&outcome),
        vec![
            NotificationKind::Status,
            NotificationKind::ThresholdAlert,
            NotificationKind::BuySignal
        ]
    );
    assert!(outcome.state.active_buy_signal);
}

#[tokio::test]
async fn test_actionable_signal_requests_automation() {
    let engine = engine();
    let ts = t(2, 10, 0);
    let outcome = engine
        .process(&Observation::new("pick", ts, dec!(2000)), NotifyMode::Manual, ts)
        .await
        .unwrap();

    assert!(outcome.signal.signal_class.is_actionable());
    let auto = outcome.automation.expect("automation intent");
    assert_eq!(auto.game_id, "pick");
    assert_eq!(auto.jackpot, dec!(2000));
    assert_ne!(auto.signal_class, SignalClass::Skip);
}

// ---- timing gate ----

#[tokio::test]
async fn test_scheduled_mode_suppresses_away_from_draw() {
    let engine = engine();
    // Lucky Day draws 03:22 UTC; mid-afternoon is far from either draw
    let ts = t(2, 15, 0);
    let outcome = engine
        .process(&Observation::new("lucky_day", ts, dec!(600000)), NotifyMode::Scheduled, ts)
        .await
        .unwrap();

    assert_eq!(outcome.phase, DecisionPhase::Suppressed);
    assert!(outcome.notifications.is_empty());
    assert!(outcome.automation.is_none());
    // State is still recorded, so the level is not alerted again later
    assert_eq!(outcome.state.hits_in_scope().len(), 3);

    let later = t(3, 3, 0);
    let near = engine
        .process(&Observation::new("lucky_day", later, dec!(610000)), NotifyMode::Scheduled, later)
        .await
        .unwrap();
    assert_eq!(near.phase, DecisionPhase::Notified);
    assert_eq!(kinds(&near), vec![NotificationKind::Status]);
}

// ---- batches ----

#[tokio::test]
async fn test_batch_isolates_failures() {
    let engine = engine();
    let ts = t(2, 10, 0);
    let batch = vec![
        Observation::new("lucky_day", ts, dec!(480000)),
        Observation::new("keno", ts, dec!(1000)),
        Observation::new("pick", ts, dec!(-5)),
        Observation::new("powerball", ts, dec!(150000000)),
        Observation::new("lucky_day", ts + Duration::minutes(5), dec!(530000)),
    ];

    let results = engine.process_batch(batch, NotifyMode::Manual, ts).await;
    assert_eq!(results.len(), 5);

    let ok = results.iter().filter(|r| r.result.is_ok()).count();
    assert_eq!(ok, 3);

    let keno = results.iter().find(|r| r.game_id == "keno").unwrap();
    assert!(matches!(keno.result, Err(EngineError::UnknownGame(_))));
    let pick = results.iter().find(|r| r.game_id == "pick").unwrap();
    assert!(matches!(pick.result, Err(EngineError::DataAnomaly { .. })));

    let lucky: Vec<_> = results.iter().filter(|r| r.game_id == "lucky_day").collect();
    assert!(lucky[1].result.as_ref().unwrap().threshold.is_some());

    let states = engine.states().await.unwrap();
    let ids: Vec<&str> = states.iter().map(|s| s.game_id.as_str()).collect();
    assert_eq!(ids, vec!["lucky_day", "powerball"]);
}

#[tokio::test]
async fn test_replaying_feed_skips_recorded_observations() {
    let engine = engine();
    let feed = vec![
        Observation::new("lucky_day", t(2, 10, 0), dec!(480000)),
        Observation::new("lucky_day", t(2, 11, 0), dec!(500000)),
    ];
    let pending = engine.pending(feed.clone()).await.unwrap();
    engine.process_batch(pending, NotifyMode::Manual, t(2, 11, 0)).await;

    let mut extended = feed;
    extended.push(Observation::new("lucky_day", t(2, 12, 0), dec!(520000)));
    let pending = engine.pending(extended).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].jackpot, dec!(520000));
}
