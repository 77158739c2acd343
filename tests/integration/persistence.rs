//! State survives a restart of the engine.

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;

use jackpot_watch::config::AppConfig;
use jackpot_watch::engine::Engine;
use jackpot_watch::storage::{JsonFileStore, SqliteStore, StateStore};
use jackpot_watch::strategy::NotifyMode;
use jackpot_watch::types::Observation;

const CONFIG: &str = r#"
    [games.lucky_day]
    ticket_cost = 1.0
    odds = 1221759
    secondary_prize_ev = 0.10
    rollover_increment = 50000
    min_threshold = 500000
    step_increment = 50000
    draw_days = ["daily"]
    draw_time = "21:22"
    utc_offset_minutes = -360
"#;

async fn run_two_sessions(first: Arc<dyn StateStore>, second: Arc<dyn StateStore>) {
    let config = AppConfig::from_toml_str(CONFIG).unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap();

    let engine = Engine::new(&config, first);
    let outcome = engine
        .process(&Observation::new("lucky_day", t0, dec!(520000)), NotifyMode::Manual, t0)
        .await
        .unwrap();
    assert_eq!(outcome.threshold.unwrap().threshold, dec!(500000));
    drop(engine);

    let engine = Engine::new(&config, second);
    let outcome = engine
        .process(&Observation::new("lucky_day", t1, dec!(540000)), NotifyMode::Manual, t1)
        .await
        .unwrap();
    // 500K already alerted before the restart
    assert!(outcome.threshold.is_none());
    assert_eq!(outcome.state.jackpot_history.len(), 2);
    assert_eq!(outcome.state.cycle_start_jackpot, Some(dec!(520000)));
}

#[tokio::test]
async fn test_json_state_file_survives_restart() {
    let path = std::env::temp_dir().join(format!("jackpot_watch_it_{}.json", uuid::Uuid::new_v4()));
    run_two_sessions(
        Arc::new(JsonFileStore::new(&path)),
        Arc::new(JsonFileStore::new(&path)),
    )
    .await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let path = std::env::temp_dir().join(format!("jackpot_watch_it_{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite:{}", path.display());
    run_two_sessions(
        Arc::new(SqliteStore::new(&url).await.unwrap()),
        Arc::new(SqliteStore::new(&url).await.unwrap()),
    )
    .await;
    let _ = std::fs::remove_file(&path);
}
