//! Shared types for the jackpot decision engine.
//!
//! These types form the data model used across all modules. The tracker,
//! evaluators and orchestrator exchange these values; collaborators
//! (scrapers, notifiers, stores) only ever see them serialized.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// A raw jackpot reading supplied by the observation feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub game_id: String,
    pub timestamp: DateTime<Utc>,
    /// Advertised (annuity) jackpot in dollars.
    pub jackpot: Decimal,
}

impl Observation {
    pub fn new(game_id: impl Into<String>, timestamp: DateTime<Utc>, jackpot: Decimal) -> Self {
        Self {
            game_id: game_id.into(),
            timestamp,
            jackpot,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ${:.0} @ {}",
            self.game_id,
            self.jackpot,
            self.timestamp.to_rfc3339()
        )
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// One entry of the retained jackpot time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotPoint {
    pub timestamp: DateTime<Utc>,
    pub jackpot: Decimal,
}

/// A threshold level recorded as reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdHit {
    pub threshold: Decimal,
    pub jackpot: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Persistent per-game state, written back after every observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: String,
    #[serde(default)]
    pub last_jackpot: Decimal,
    /// Value of `last_jackpot` before the most recent change.
    #[serde(default)]
    pub previous_jackpot: Option<Decimal>,
    #[serde(default)]
    pub last_threshold_hit: Option<Decimal>,
    #[serde(default)]
    pub last_alert_time: Option<DateTime<Utc>>,
    /// Jackpot at the start of the current cycle. `None` until the first
    /// observation has been tracked.
    #[serde(default)]
    pub cycle_start_jackpot: Option<Decimal>,
    #[serde(default)]
    pub cycle_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rollover_count: u32,
    /// Rollover counts at which earlier cycles ended, oldest first. Bounded.
    #[serde(default)]
    pub completed_cycles: Vec<u32>,
    /// Audit list of every threshold level ever reached. Never truncated.
    #[serde(default)]
    pub thresholds_hit: Vec<ThresholdHit>,
    /// Index into `thresholds_hit` where the current alert scope begins.
    /// Entries before it belong to earlier cycles (or a manual reset).
    #[serde(default)]
    pub alert_scope_start: usize,
    #[serde(default)]
    pub jackpot_history: Vec<JackpotPoint>,
    #[serde(default)]
    pub active_buy_signal: bool,
    #[serde(default)]
    pub buy_signal_last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub buy_signal_reminder_sent: bool,
    /// Draw the last reminder was sent for.
    #[serde(default)]
    pub buy_signal_reminded_draw: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] jackpot=${:.0} | rollovers={} | cycle_start={} | alerts={} | history={}",
            self.game_id,
            self.last_jackpot,
            self.rollover_count,
            self.cycle_start_jackpot
                .map(|j| format!("${j:.0}"))
                .unwrap_or_else(|| "-".to_string()),
            self.thresholds_hit.len(),
            self.jackpot_history.len(),
        )
    }
}

impl GameState {
    /// Fresh state for a game that has never been observed.
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            last_jackpot: Decimal::ZERO,
            previous_jackpot: None,
            last_threshold_hit: None,
            last_alert_time: None,
            cycle_start_jackpot: None,
            cycle_started_at: None,
            rollover_count: 0,
            completed_cycles: Vec::new(),
            thresholds_hit: Vec::new(),
            alert_scope_start: 0,
            jackpot_history: Vec::new(),
            active_buy_signal: false,
            buy_signal_last_seen: None,
            buy_signal_reminder_sent: false,
            buy_signal_reminded_draw: None,
            updated_at: None,
        }
    }

    /// Whether no observation has been tracked yet.
    pub fn is_fresh(&self) -> bool {
        self.cycle_start_jackpot.is_none() && self.jackpot_history.is_empty()
    }

    /// Threshold hits recorded in the current alert scope.
    pub fn hits_in_scope(&self) -> &[ThresholdHit] {
        let start = self.alert_scope_start.min(self.thresholds_hit.len());
        &self.thresholds_hit[start..]
    }

    /// Highest threshold already alerted in the current scope.
    pub fn highest_hit_in_scope(&self) -> Option<Decimal> {
        self.hits_in_scope().iter().map(|h| h.threshold).max()
    }

    /// Start a new alert scope. The audit list itself is kept.
    pub fn open_alert_scope(&mut self) {
        self.alert_scope_start = self.thresholds_hit.len();
        self.last_threshold_hit = None;
    }

    /// Timestamp of the most recent retained observation.
    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.jackpot_history.last().map(|p| p.timestamp)
    }

    /// Change between the two most recent distinct readings.
    pub fn jackpot_change(&self) -> Option<Decimal> {
        self.previous_jackpot.map(|prev| self.last_jackpot - prev)
    }
}

// ---------------------------------------------------------------------------
// EV result
// ---------------------------------------------------------------------------

/// Expected-value breakdown for one ticket at a given jackpot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvResult {
    pub jackpot: Decimal,
    pub ticket_cost: Decimal,
    pub after_tax_jackpot: Decimal,
    pub primary_ev: Decimal,
    pub secondary_ev: Decimal,
    pub total_ev: Decimal,
    pub net_ev: Decimal,
    pub ev_percentage: Decimal,
    pub break_even_jackpot: Decimal,
    pub is_positive_ev: bool,
}

impl fmt::Display for EvResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jackpot=${:.0} after_tax=${:.2} total_ev=${:.4} net_ev=${:.2} ({:.2}%) break_even=${:.0}",
            self.jackpot,
            self.after_tax_jackpot,
            self.total_ev,
            self.net_ev,
            self.ev_percentage,
            self.break_even_jackpot,
        )
    }
}

// ---------------------------------------------------------------------------
// Signal enums
// ---------------------------------------------------------------------------

/// Coarse EV tier derived from `ev_percentage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvTier {
    ValueOpportunity,
    Watchlist,
    NotRecommended,
}

impl fmt::Display for EvTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvTier::ValueOpportunity => write!(f, "VALUE_OPPORTUNITY"),
            EvTier::Watchlist => write!(f, "WATCHLIST"),
            EvTier::NotRecommended => write!(f, "NOT_RECOMMENDED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentumClass {
    Strong,
    Moderate,
    Weak,
}

impl fmt::Display for MomentumClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MomentumClass::Strong => write!(f, "STRONG"),
            MomentumClass::Moderate => write!(f, "MODERATE"),
            MomentumClass::Weak => write!(f, "WEAK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowthClass {
    Strong,
    Moderate,
    Weak,
    None,
}

impl fmt::Display for GrowthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowthClass::Strong => write!(f, "STRONG"),
            GrowthClass::Moderate => write!(f, "MODERATE"),
            GrowthClass::Weak => write!(f, "WEAK"),
            GrowthClass::None => write!(f, "NONE"),
        }
    }
}

/// Discrete signal class derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClass {
    StrongOpportunity,
    ModerateOpportunity,
    Watchlist,
    Skip,
}

impl SignalClass {
    /// Classes that may trigger purchase automation.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            SignalClass::StrongOpportunity | SignalClass::ModerateOpportunity
        )
    }
}

impl fmt::Display for SignalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalClass::StrongOpportunity => write!(f, "STRONG_OPPORTUNITY"),
            SignalClass::ModerateOpportunity => write!(f, "MODERATE_OPPORTUNITY"),
            SignalClass::Watchlist => write!(f, "WATCHLIST"),
            SignalClass::Skip => write!(f, "SKIP"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal result
// ---------------------------------------------------------------------------

/// Composite buy-signal classification for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub ev_tier: EvTier,
    /// `ev_percentage` mapped into [0, 1].
    pub ev_score: Decimal,
    pub momentum_class: MomentumClass,
    pub momentum_score: Decimal,
    pub growth_class: GrowthClass,
    pub growth_score: Decimal,
    /// Percentage change between the two latest readings, when computable.
    pub growth_pct: Option<Decimal>,
    pub composite_score: Decimal,
    pub signal_class: SignalClass,
}

impl fmt::Display for SignalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (score={:.3}) | ev={} momentum={} growth={}",
            self.signal_class,
            self.composite_score,
            self.ev_tier,
            self.momentum_class,
            self.growth_class,
        )
    }
}

// ---------------------------------------------------------------------------
// Threshold event
// ---------------------------------------------------------------------------

/// Emitted when an observation reaches a threshold level not yet alerted
/// in the current scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub game_id: String,
    /// Highest newly reached level.
    pub threshold: Decimal,
    pub jackpot: Decimal,
    pub previous_jackpot: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    /// Number of levels newly marked by this observation (≥ 1).
    pub levels_crossed: usize,
}

impl fmt::Display for ThresholdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] threshold ${:.0} reached (jackpot ${:.0}, {} level(s))",
            self.game_id, self.threshold, self.jackpot, self.levels_crossed,
        )
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Status,
    ThresholdAlert,
    BuySignal,
    Reminder,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Status => write!(f, "STATUS"),
            NotificationKind::ThresholdAlert => write!(f, "THRESHOLD_ALERT"),
            NotificationKind::BuySignal => write!(f, "BUY_SIGNAL"),
            NotificationKind::Reminder => write!(f, "REMINDER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub ev: EvResult,
    pub signal: SignalResult,
    pub threshold: Option<ThresholdEvent>,
    pub rollover_count: u32,
    pub minutes_to_draw: Option<i64>,
}

/// Structured notification request handed to the notifier collaborator.
/// Rendering into user-facing text happens on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: Uuid,
    pub game_id: String,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub timestamp: DateTime<Utc>,
}

impl NotificationIntent {
    pub fn new(
        game_id: impl Into<String>,
        kind: NotificationKind,
        payload: NotificationPayload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_id: game_id.into(),
            kind,
            payload,
            timestamp,
        }
    }
}

impl fmt::Display for NotificationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] net_ev=${:.2} {}",
            self.kind, self.game_id, self.payload.ev.net_ev, self.payload.signal.signal_class,
        )
    }
}

/// Request for the purchase-automation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationIntent {
    pub id: Uuid,
    pub game_id: String,
    pub signal_class: SignalClass,
    pub jackpot: Decimal,
    pub net_ev: Decimal,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Data problems detected while tracking an observation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Anomaly {
    #[error("negative jackpot ${jackpot}")]
    NegativeJackpot { jackpot: Decimal },

    #[error("jackpot ${jackpot} exceeds the plausible maximum ${max}")]
    OutOfRange { jackpot: Decimal, max: Decimal },

    #[error("jackpot jumped from ${previous} to ${jackpot} without a cycle reset")]
    ImplausibleJump { previous: Decimal, jackpot: Decimal },

    #[error("observation at {observed} is older than last recorded {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        observed: DateTime<Utc>,
    },

    #[error("rollover count would regress from {previous} to {computed}")]
    RolloverRegression { previous: u32, computed: u32 },
}

/// Domain error taxonomy for the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error ({game_id}): {source}")]
    Config {
        game_id: String,
        #[source]
        source: ConfigError,
    },

    #[error("Data anomaly ({game_id}): {anomaly}")]
    DataAnomaly { game_id: String, anomaly: Anomaly },

    #[error("Computation error ({game_id}): {context}")]
    Computation { game_id: String, context: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown game: {0}")]
    UnknownGame(String),
}

impl EngineError {
    /// Game the error belongs to, when it is game-scoped.
    pub fn game_id(&self) -> Option<&str> {
        match self {
            EngineError::Config { game_id, .. }
            | EngineError::DataAnomaly { game_id, .. }
            | EngineError::Computation { game_id, .. } => Some(game_id),
            EngineError::UnknownGame(id) => Some(id),
            EngineError::Storage(_) => None,
        }
    }

    /// Recoverable errors leave the game eligible for the next observation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::DataAnomaly { .. } | EngineError::Storage(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
