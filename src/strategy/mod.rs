//! Decision engine: EV calculation, threshold ladder, signal classification,
//! and the orchestrator that sequences them per observation.

pub mod ev;
pub mod signal;
pub mod threshold;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, GameConfig};
use crate::engine::tracker::StateTracker;
use crate::types::{
    Anomaly, AutomationIntent, EngineError, EvResult, GameState, NotificationIntent,
    NotificationKind, NotificationPayload, Observation, SignalResult, ThresholdEvent,
};
use signal::{passes_buy_gate, SignalClassifier};

// ---------------------------------------------------------------------------
// Modes and phases
// ---------------------------------------------------------------------------

/// How the caller wants outbound notifications gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    /// Report every game regardless of draw timing.
    Manual,
    /// Only notify within the draw window of the game's previous/next draw.
    Scheduled,
}

/// Per-game decision state machine.
///
/// `Idle → Observed → Evaluated → Notified | Suppressed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionPhase {
    Idle,
    /// Observation accepted by the tracker.
    Observed,
    /// EV, thresholds and signal computed.
    Evaluated,
    /// Intents emitted.
    Notified,
    /// Intents withheld by the timing gate.
    Suppressed,
}

impl DecisionPhase {
    pub fn can_advance_to(self, next: DecisionPhase) -> bool {
        use DecisionPhase::*;
        matches!(
            (self, next),
            (Idle, Observed) | (Observed, Evaluated) | (Evaluated, Notified) | (Evaluated, Suppressed)
        )
    }

    fn advance(&mut self, next: DecisionPhase, game_id: &str) {
        debug_assert!(self.can_advance_to(next), "{self:?} -> {next:?}");
        debug!(game_id, from = ?*self, to = ?next, "Decision phase");
        *self = next;
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// EV and signal for a game at its current jackpot, without touching state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub ev: EvResult,
    pub signal: SignalResult,
    pub buy_signal: bool,
}

/// Everything one observation produced. `state` is the updated state the
/// caller must persist; nothing has been written yet.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub game_id: String,
    pub observation: Observation,
    pub state: GameState,
    pub cycle_reset: bool,
    pub ev: EvResult,
    pub signal: SignalResult,
    pub threshold: Option<ThresholdEvent>,
    /// Buy gate result, independent of the timing gate.
    pub buy_signal: bool,
    pub phase: DecisionPhase,
    pub notifications: Vec<NotificationIntent>,
    pub automation: Option<AutomationIntent>,
    /// Non-fatal data problems seen while tracking.
    pub anomalies: Vec<Anomaly>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs tracker → EV → threshold → classifier → gates for one observation.
///
/// Works on a copy of the game state; the copy is only returned when every
/// step succeeded, so a failure never leaves a half-updated state behind.
pub struct DecisionOrchestrator {
    tracker: StateTracker,
    classifier: SignalClassifier,
    ev_threshold: Decimal,
    draw_window_minutes: i64,
}

impl DecisionOrchestrator {
    pub fn new(
        tracker: StateTracker,
        classifier: SignalClassifier,
        ev_threshold: Decimal,
        draw_window_minutes: i64,
    ) -> Self {
        Self {
            tracker,
            classifier,
            ev_threshold,
            draw_window_minutes,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            StateTracker::from_config(&config.engine),
            SignalClassifier::new(config.signal.clone()),
            config.engine.ev_threshold,
            config.engine.draw_window_minutes,
        )
    }

    pub fn ev_threshold(&self) -> Decimal {
        self.ev_threshold
    }

    /// Evaluate one observation against `state`.
    pub fn evaluate(
        &self,
        state: &GameState,
        obs: &Observation,
        game: &GameConfig,
        mode: NotifyMode,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, EngineError> {
        if obs.game_id != game.id {
            return Err(EngineError::UnknownGame(obs.game_id.clone()));
        }
        let mut phase = DecisionPhase::Idle;

        // Step 1 – state tracker
        let (mut next, update) = self.tracker.update(state, obs, game)?;
        phase.advance(DecisionPhase::Observed, &game.id);

        // Step 2 – EV
        let ev = ev::compute_ev(obs.jackpot, game).map_err(|e| {
            error!(game_id = %game.id, error = %e, "EV calculation failed");
            e
        })?;

        // Step 3 – threshold ladder
        let threshold = threshold::check_threshold(&mut next, obs.jackpot, obs.timestamp, game);

        // Step 4 – classification
        let signal = self.classifier.classify(&ev, &next, game).map_err(|e| {
            error!(game_id = %game.id, error = %e, "Signal classification failed");
            e
        })?;
        phase.advance(DecisionPhase::Evaluated, &game.id);

        let buy_signal = passes_buy_gate(ev.net_ev, self.ev_threshold);
        track_buy_signal(&mut next, buy_signal, obs.timestamp);

        // Timing gate, evaluated once for every intent of this observation
        let deliver = match mode {
            NotifyMode::Manual => true,
            NotifyMode::Scheduled => game.schedule.is_near_draw(now, self.draw_window_minutes),
        };

        let payload = NotificationPayload {
            ev: ev.clone(),
            signal: signal.clone(),
            threshold: threshold.clone(),
            rollover_count: next.rollover_count,
            minutes_to_draw: game.schedule.minutes_to_next_draw(now),
        };
        let mut due = vec![NotificationKind::Status];
        if threshold.is_some() {
            due.push(NotificationKind::ThresholdAlert);
        }
        if buy_signal {
            due.push(NotificationKind::BuySignal);
        }

        let (notifications, automation) = if deliver {
            phase.advance(DecisionPhase::Notified, &game.id);
            let intents = due
                .into_iter()
                .map(|kind| NotificationIntent::new(&game.id, kind, payload.clone(), now))
                .collect();
            let automation = (signal.signal_class.is_actionable() && game.automation_eligible)
                .then(|| AutomationIntent {
                    id: Uuid::new_v4(),
                    game_id: game.id.clone(),
                    signal_class: signal.signal_class,
                    jackpot: obs.jackpot,
                    net_ev: ev.net_ev,
                    timestamp: now,
                });
            (intents, automation)
        } else {
            phase.advance(DecisionPhase::Suppressed, &game.id);
            if threshold.is_some() || buy_signal {
                info!(
                    game_id = %game.id,
                    threshold = threshold.is_some(),
                    buy_signal,
                    "Alert suppressed outside draw window"
                );
            }
            (Vec::new(), None)
        };

        let anomalies: Vec<Anomaly> = update.anomaly.into_iter().collect();
        for a in &anomalies {
            warn!(game_id = %game.id, anomaly = %a, "Data anomaly recorded");
        }

        info!(
            game_id = %game.id,
            jackpot = %obs.jackpot,
            net_ev = %ev.net_ev.round_dp(2),
            ev_pct = %ev.ev_percentage.round_dp(2),
            rollovers = next.rollover_count,
            signal = %signal.signal_class,
            buy_signal,
            phase = ?phase,
            "Observation evaluated"
        );

        Ok(DecisionOutcome {
            game_id: game.id.clone(),
            observation: obs.clone(),
            state: next,
            cycle_reset: update.cycle_reset,
            ev,
            signal,
            threshold,
            buy_signal,
            phase,
            notifications,
            automation,
            anomalies,
        })
    }

    /// EV, signal and gate for the game's last known jackpot.
    pub fn assess(&self, state: &GameState, game: &GameConfig) -> Result<Assessment, EngineError> {
        let ev = ev::compute_ev(state.last_jackpot, game)?;
        let signal = self.classifier.classify(&ev, state, game)?;
        let buy_signal = passes_buy_gate(ev.net_ev, self.ev_threshold);
        Ok(Assessment {
            ev,
            signal,
            buy_signal,
        })
    }
}

/// Keep the active buy-signal flags in step with the gate. A signal that
/// becomes active again starts with no reminder sent; while it stays active
/// reminders are tracked per draw.
pub fn track_buy_signal(state: &mut GameState, fired: bool, at: DateTime<Utc>) {
    if fired {
        if !state.active_buy_signal {
            state.buy_signal_reminder_sent = false;
            state.buy_signal_reminded_draw = None;
        }
        state.active_buy_signal = true;
        state.buy_signal_last_seen = Some(at);
    } else {
        state.active_buy_signal = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
