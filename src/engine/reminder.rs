//! Buy-signal reminders.
//!
//! A game whose buy gate fired keeps an active signal until the gate stops
//! holding. A few hours before the next draw the signal is re-checked
//! against the last known jackpot and, if it still holds, one reminder is
//! emitted for that draw. A signal that stays active is reminded again
//! before each later draw. Reminders ignore the near-draw timing gate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{EngineConfig, GameConfig};
use crate::strategy::DecisionOrchestrator;
use crate::types::{EngineError, GameState, NotificationIntent, NotificationKind, NotificationPayload};

#[derive(Debug, Clone, Copy)]
pub struct ReminderWindow {
    pub lead_minutes: i64,
    pub tolerance_minutes: i64,
}

impl ReminderWindow {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            lead_minutes: config.reminder_lead_minutes,
            tolerance_minutes: config.reminder_tolerance_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoActiveSignal,
    AlreadySent,
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReminderDecision {
    /// Gate still holds; reminder emitted and marked sent.
    Sent(NotificationIntent),
    /// Gate no longer holds; active signal cleared.
    Cleared,
    Skipped(SkipReason),
}

impl ReminderDecision {
    /// Whether `state` was modified and needs to be persisted.
    pub fn changes_state(&self) -> bool {
        !matches!(self, ReminderDecision::Skipped(_))
    }
}

/// Run the reminder check for one game, updating `state` in place.
pub fn check_reminder(
    orchestrator: &DecisionOrchestrator,
    state: &mut GameState,
    game: &GameConfig,
    window: ReminderWindow,
    now: DateTime<Utc>,
) -> Result<ReminderDecision, EngineError> {
    if !state.active_buy_signal {
        return Ok(ReminderDecision::Skipped(SkipReason::NoActiveSignal));
    }
    let next_draw = game.schedule.next_draw(now);
    if state.buy_signal_reminder_sent && state.buy_signal_reminded_draw == next_draw {
        return Ok(ReminderDecision::Skipped(SkipReason::AlreadySent));
    }
    if !game
        .schedule
        .in_reminder_window(now, window.lead_minutes, window.tolerance_minutes)
    {
        debug!(game_id = %game.id, "Outside reminder window");
        return Ok(ReminderDecision::Skipped(SkipReason::OutsideWindow));
    }

    let assessment = orchestrator.assess(state, game)?;
    if !assessment.buy_signal {
        state.active_buy_signal = false;
        info!(
            game_id = %game.id,
            net_ev = %assessment.ev.net_ev.round_dp(2),
            "Buy signal no longer holds, cleared"
        );
        return Ok(ReminderDecision::Cleared);
    }

    state.buy_signal_reminder_sent = true;
    state.buy_signal_reminded_draw = next_draw;
    let intent = NotificationIntent::new(
        &game.id,
        NotificationKind::Reminder,
        NotificationPayload {
            ev: assessment.ev,
            signal: assessment.signal,
            threshold: None,
            rollover_count: state.rollover_count,
            minutes_to_draw: game.schedule.minutes_to_next_draw(now),
        },
        now,
    );
    info!(
        game_id = %game.id,
        minutes_to_draw = ?intent.payload.minutes_to_draw,
        "Buy-signal reminder sent"
    );
    Ok(ReminderDecision::Sent(intent))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
