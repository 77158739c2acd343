//! Engine runtime: per-game serialization around the decision orchestrator.
//!
//! Every state change for a game happens as load → evaluate → save while
//! holding that game's lock, so two observations for the same game never
//! interleave. Different games run concurrently.

pub mod reminder;
pub mod schedule;
pub mod tracker;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::config::{AppConfig, ConfigError, GameConfig};
use crate::storage::StateStore;
use crate::strategy::{Assessment, DecisionOrchestrator, DecisionOutcome, NotifyMode};
use crate::types::{EngineError, GameState, Observation};
use reminder::{check_reminder, ReminderDecision, ReminderWindow};
use schedule::{format_time_to_draw, ScheduledCheck};

/// Default size of the alert history query.
pub const ALERT_HISTORY_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Per-observation result of a batch run.
#[derive(Debug)]
pub struct GameResult {
    pub game_id: String,
    pub result: Result<DecisionOutcome, EngineError>,
}

/// One threshold hit, flattened across games for the history view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub game_id: String,
    pub threshold: Decimal,
    pub jackpot: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of one game for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    pub game_id: String,
    pub name: String,
    pub state: Option<GameState>,
    pub assessment: Option<Assessment>,
    pub next_draw: Option<DateTime<Utc>>,
    pub time_to_draw: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    games: BTreeMap<String, GameConfig>,
    rejected: BTreeMap<String, ConfigError>,
    orchestrator: DecisionOrchestrator,
    reminder_window: ReminderWindow,
    post_draw_check_minutes: i64,
    store: Arc<dyn StateStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    /// Validate the configured games and wire up the orchestrator. Games
    /// that fail validation are logged and excluded.
    pub fn new(config: &AppConfig, store: Arc<dyn StateStore>) -> Self {
        let validated = config.validate_games();
        for (id, err) in &validated.rejected {
            error!(game_id = %id, error = %err, "Game configuration rejected");
        }
        info!(
            games = validated.games.len(),
            rejected = validated.rejected.len(),
            "Engine initialised"
        );

        Self {
            games: validated.games,
            rejected: validated.rejected,
            orchestrator: DecisionOrchestrator::from_config(config),
            reminder_window: ReminderWindow::from_config(&config.engine),
            post_draw_check_minutes: config.engine.post_draw_check_minutes,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn games(&self) -> &BTreeMap<String, GameConfig> {
        &self.games
    }

    pub fn rejected(&self) -> &BTreeMap<String, ConfigError> {
        &self.rejected
    }

    pub fn game(&self, game_id: &str) -> Result<&GameConfig, EngineError> {
        if let Some(game) = self.games.get(game_id) {
            return Ok(game);
        }
        match self.rejected.get(game_id) {
            Some(err) => Err(EngineError::Config {
                game_id: game_id.to_string(),
                source: err.clone(),
            }),
            None => Err(EngineError::UnknownGame(game_id.to_string())),
        }
    }

    fn lock_for(&self, game_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(game_id.to_string()).or_default().clone()
    }

    async fn load_state(&self, game_id: &str) -> Result<GameState, EngineError> {
        let stored = self
            .store
            .load(game_id)
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))?;
        Ok(stored.unwrap_or_else(|| GameState::new(game_id)))
    }

    async fn save_state(&self, state: &GameState) -> Result<(), EngineError> {
        self.store
            .save(state)
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))
    }

    // ---- observations ------------------------------------------------------

    /// Evaluate one observation and persist the resulting state.
    ///
    /// Nothing is written unless every step succeeds; on error the stored
    /// state is exactly what it was before the call.
    pub async fn process(
        &self,
        obs: &Observation,
        mode: NotifyMode,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, EngineError> {
        let game = self.game(&obs.game_id)?;
        let lock = self.lock_for(&game.id);
        let _guard = lock.lock().await;

        let state = self.load_state(&game.id).await?;
        let outcome = match self.orchestrator.evaluate(&state, obs, game, mode, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_recoverable() {
                    warn!(game_id = %game.id, error = %e, "Observation rejected");
                } else {
                    error!(game_id = %game.id, error = %e, "Observation failed");
                }
                return Err(e);
            }
        };

        self.save_state(&outcome.state).await?;
        Ok(outcome)
    }

    /// Process a batch of observations. Games run concurrently, observations
    /// for the same game run in feed order. One game's failure never stops
    /// another's.
    pub async fn process_batch(
        &self,
        observations: Vec<Observation>,
        mode: NotifyMode,
        now: DateTime<Utc>,
    ) -> Vec<GameResult> {
        let total = observations.len();
        let mut by_game: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            by_game.entry(obs.game_id.clone()).or_default().push(obs);
        }

        let runs = by_game.into_values().map(|group| async move {
            let mut out = Vec::with_capacity(group.len());
            for obs in group {
                let result = self.process(&obs, mode, now).await;
                out.push(GameResult {
                    game_id: obs.game_id,
                    result,
                });
            }
            out
        });
        let results: Vec<GameResult> = join_all(runs).await.into_iter().flatten().collect();

        let failed = results.iter().filter(|r| r.result.is_err()).count();
        info!(
            observations = total,
            succeeded = total - failed,
            failed,
            "Batch complete"
        );
        results
    }

    /// Drop observations at or before the last recorded reading for their
    /// game, so re-reading the same feed does not record duplicates.
    pub async fn pending(&self, observations: Vec<Observation>) -> Result<Vec<Observation>, EngineError> {
        let mut last_seen: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        let mut out = Vec::with_capacity(observations.len());
        for obs in observations {
            if !last_seen.contains_key(&obs.game_id) {
                let stored = self
                    .store
                    .load(&obs.game_id)
                    .await
                    .map_err(|e| EngineError::Storage(format!("{e:#}")))?;
                last_seen.insert(
                    obs.game_id.clone(),
                    stored.and_then(|s| s.last_observed_at()),
                );
            }
            let seen = last_seen.get(&obs.game_id).copied().flatten();
            if seen.map_or(true, |last| obs.timestamp > last) {
                out.push(obs);
            }
        }
        Ok(out)
    }

    // ---- reminders ---------------------------------------------------------

    /// Run the buy-signal reminder pass over every configured game.
    pub async fn check_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<ReminderDecision, EngineError>)> {
        let runs = self.games.values().map(|game| async move {
            let result = self.remind_one(game, now).await;
            if let Err(e) = &result {
                warn!(game_id = %game.id, error = %e, "Reminder check failed");
            }
            (game.id.clone(), result)
        });
        join_all(runs).await
    }

    async fn remind_one(
        &self,
        game: &GameConfig,
        now: DateTime<Utc>,
    ) -> Result<ReminderDecision, EngineError> {
        let lock = self.lock_for(&game.id);
        let _guard = lock.lock().await;

        let mut state = self.load_state(&game.id).await?;
        let decision = check_reminder(&self.orchestrator, &mut state, game, self.reminder_window, now)?;
        if decision.changes_state() {
            self.save_state(&state).await?;
        }
        Ok(decision)
    }

    // ---- manual corrections ------------------------------------------------

    /// Override the tracked rollover count.
    ///
    /// Without an explicit `cycle_start` the cycle start is moved to
    /// `last_jackpot − count × increment`, so the next observation continues
    /// from the corrected count. A game with no observed jackpot needs an
    /// explicit cycle start.
    pub async fn set_rollover(
        &self,
        game_id: &str,
        rollover_count: u32,
        cycle_start: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<GameState, EngineError> {
        let game = self.game(game_id)?;
        let lock = self.lock_for(&game.id);
        let _guard = lock.lock().await;

        let mut state = self.load_state(&game.id).await?;
        let start = match cycle_start {
            Some(start) if start < Decimal::ZERO => {
                return Err(EngineError::Computation {
                    game_id: game.id.clone(),
                    context: format!("cycle start must be >= 0, got {start}"),
                });
            }
            Some(start) => start,
            None => implied_cycle_start(&state, game, rollover_count)?,
        };

        let previous = state.rollover_count;
        state.rollover_count = rollover_count;
        state.cycle_start_jackpot = Some(start);
        state.updated_at = Some(now);
        self.save_state(&state).await?;

        info!(
            game_id = %game.id,
            previous,
            rollover_count,
            cycle_start = ?state.cycle_start_jackpot,
            "Rollover count overridden"
        );
        Ok(state)
    }

    /// Open a fresh alert scope for one game, or for every configured game.
    /// Returns the ids that were reset; games with no stored state are skipped.
    pub async fn reset_thresholds(&self, game_id: Option<&str>) -> Result<Vec<String>, EngineError> {
        let targets: Vec<&GameConfig> = match game_id {
            Some(id) => vec![self.game(id)?],
            None => self.games.values().collect(),
        };

        let mut reset = Vec::new();
        for game in targets {
            let lock = self.lock_for(&game.id);
            let _guard = lock.lock().await;

            let stored = self
                .store
                .load(&game.id)
                .await
                .map_err(|e| EngineError::Storage(format!("{e:#}")))?;
            let Some(mut state) = stored else {
                continue;
            };
            state.open_alert_scope();
            self.save_state(&state).await?;
            info!(game_id = %game.id, "Threshold alerts reset");
            reset.push(game.id.clone());
        }
        Ok(reset)
    }

    // ---- queries -----------------------------------------------------------

    pub async fn states(&self) -> Result<Vec<GameState>, EngineError> {
        self.store
            .list()
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))
    }

    /// Most recent threshold hits across all games, newest first.
    pub async fn alert_history(&self, limit: usize) -> Result<Vec<AlertRecord>, EngineError> {
        let mut records: Vec<AlertRecord> = self
            .states()
            .await?
            .into_iter()
            .flat_map(|state| {
                let game_id = state.game_id;
                state.thresholds_hit.into_iter().map(move |hit| AlertRecord {
                    game_id: game_id.clone(),
                    threshold: hit.threshold,
                    jackpot: hit.jackpot,
                    timestamp: hit.timestamp,
                })
            })
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn game_status(&self, game_id: &str, now: DateTime<Utc>) -> Result<GameStatus, EngineError> {
        let game = self.game(game_id)?;
        let stored = self
            .store
            .load(&game.id)
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))?;

        let assessment = match &stored {
            Some(state) if !state.is_fresh() => match self.orchestrator.assess(state, game) {
                Ok(a) => Some(a),
                Err(e) => {
                    warn!(game_id = %game.id, error = %e, "Assessment failed");
                    None
                }
            },
            _ => None,
        };
        let next_draw = game.schedule.next_draw(now);

        Ok(GameStatus {
            game_id: game.id.clone(),
            name: game.name.clone(),
            state: stored,
            assessment,
            next_draw,
            time_to_draw: next_draw.map(|d| format_time_to_draw(d - now)),
        })
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<Vec<GameStatus>, EngineError> {
        let mut out = Vec::with_capacity(self.games.len());
        for id in self.games.keys() {
            out.push(self.game_status(id, now).await?);
        }
        Ok(out)
    }

    /// Weekly check plan per game.
    pub fn check_plans(&self) -> BTreeMap<String, Vec<ScheduledCheck>> {
        self.games
            .values()
            .map(|g| {
                (
                    g.id.clone(),
                    g.schedule
                        .check_plan(self.post_draw_check_minutes, self.reminder_window.lead_minutes),
                )
            })
            .collect()
    }
}

/// Cycle start that makes `count` the rollover count at `last_jackpot`.
fn implied_cycle_start(
    state: &GameState,
    game: &GameConfig,
    count: u32,
) -> Result<Decimal, EngineError> {
    if state.jackpot_history.is_empty() {
        return Err(EngineError::Computation {
            game_id: game.id.clone(),
            context: "no observed jackpot to anchor the rollover count; pass a cycle start".into(),
        });
    }
    let offset = game
        .rollover_increment
        .checked_mul(Decimal::from(count))
        .ok_or_else(|| EngineError::Computation {
            game_id: game.id.clone(),
            context: format!("rollover count {count} overflows the cycle start"),
        })?;
    let start = state.last_jackpot - offset.min(state.last_jackpot);
    if offset > state.last_jackpot {
        warn!(
            game_id = %game.id,
            count,
            last_jackpot = %state.last_jackpot,
            "Rollover count exceeds the current jackpot, cycle start clamped at zero"
        );
    }
    Ok(start)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
