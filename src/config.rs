//! Configuration loading from TOML with environment overrides.
//!
//! Resolution happens once at startup: built-in defaults, then
//! `config.toml`, then a small set of environment overrides. Raw per-game
//! tables are then validated into immutable [`GameConfig`] values; games
//! that fail validation are excluded and reported, the rest proceed.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Application config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ev: EvDefaults,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub games: BTreeMap<String, RawGameConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Buy gate: notify when `net_ev >= ev_threshold` (or EV is positive).
    pub ev_threshold: Decimal,
    /// Scheduled mode only notifies within this many minutes of a draw.
    pub draw_window_minutes: i64,
    pub history_retention_days: i64,
    /// A reading above `previous × factor` is rejected as implausible.
    pub max_jump_factor: Decimal,
    /// Readings above this are rejected outright.
    pub max_jackpot: Decimal,
    pub reminder_lead_minutes: i64,
    pub reminder_tolerance_minutes: i64,
    /// Scheduled post-draw check offset.
    pub post_draw_check_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ev_threshold: dec!(-0.20),
            draw_window_minutes: 60,
            history_retention_days: 30,
            max_jump_factor: dec!(10),
            max_jackpot: dec!(100000000000),
            reminder_lead_minutes: 180,
            reminder_tolerance_minutes: 5,
            post_draw_check_minutes: 30,
        }
    }
}

/// Payout assumptions shared by every game unless overridden per game.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvDefaults {
    pub tax_rate: Decimal,
    pub lump_sum_factor: Decimal,
    pub include_secondary_prizes: bool,
}

impl Default for EvDefaults {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.37),
            lump_sum_factor: dec!(0.61),
            include_secondary_prizes: true,
        }
    }
}

/// Buy-signal classifier settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignalConfig {
    /// Growth (percent between the last two readings) for STRONG.
    pub growth_strong_pct: Decimal,
    pub growth_moderate_pct: Decimal,
    /// Fewer completed cycles than this falls back to the baseline.
    pub min_completed_cycles: usize,
    pub momentum_baseline: MomentumBaseline,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            growth_strong_pct: dec!(15),
            growth_moderate_pct: dec!(5),
            min_completed_cycles: 5,
            momentum_baseline: MomentumBaseline::default(),
        }
    }
}

/// Rollover-count percentiles used when history is too thin.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct MomentumBaseline {
    pub p75: u32,
    pub p95: u32,
}

impl Default for MomentumBaseline {
    fn default() -> Self {
        Self { p75: 10, p95: 20 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// File path (json) or database URL (sqlite).
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: "lottery_state.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-game config
// ---------------------------------------------------------------------------

/// Comparison used when checking a jackpot against a threshold level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdOperator {
    #[default]
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = ">")]
    Above,
}

impl ThresholdOperator {
    pub fn crosses(&self, jackpot: Decimal, threshold: Decimal) -> bool {
        match self {
            ThresholdOperator::AtLeast => jackpot >= threshold,
            ThresholdOperator::Above => jackpot > threshold,
        }
    }
}

/// A game table exactly as written in `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct RawGameConfig {
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub ticket_cost: Decimal,
    pub odds: u64,
    #[serde(default)]
    pub secondary_prize_ev: Decimal,
    pub tax_rate: Option<Decimal>,
    pub lump_sum_factor: Option<Decimal>,
    #[serde(default)]
    pub rollover_increment: Decimal,
    /// Absolute ceiling a dropped jackpot must fall below to count as a new
    /// cycle (large-jackpot and daily-draw classes).
    pub reset_floor: Option<Decimal>,
    #[serde(default)]
    pub threshold_operator: ThresholdOperator,
    pub min_threshold: Option<Decimal>,
    pub step_increment: Option<Decimal>,
    pub draw_days: Vec<String>,
    pub draw_time: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub automation_eligible: bool,
    pub momentum_baseline: Option<MomentumBaseline>,
}

fn default_true() -> bool {
    true
}

/// When a game draws.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSchedule {
    pub days: Vec<Weekday>,
    pub time: NaiveTime,
    pub utc_offset: FixedOffset,
}

/// Validated, immutable game parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub id: String,
    pub name: String,
    pub ticket_cost: Decimal,
    pub odds: u64,
    pub secondary_prize_ev: Decimal,
    pub tax_rate: Decimal,
    pub lump_sum_factor: Decimal,
    pub rollover_increment: Decimal,
    pub reset_floor: Option<Decimal>,
    pub threshold_operator: ThresholdOperator,
    pub min_threshold: Option<Decimal>,
    pub step_increment: Option<Decimal>,
    pub schedule: DrawSchedule,
    pub automation_eligible: bool,
    pub momentum_baseline: Option<MomentumBaseline>,
}

/// Reasons a game table is rejected at load time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("odds denominator must be > 0")]
    ZeroOdds,

    #[error("ticket cost must be > 0, got {0}")]
    TicketCost(Decimal),

    #[error("tax rate must be in [0, 1), got {0}")]
    TaxRate(Decimal),

    #[error("lump-sum factor must be in (0, 1], got {0}")]
    LumpSumFactor(Decimal),

    #[error("secondary prize EV must be >= 0, got {0}")]
    SecondaryEv(Decimal),

    #[error("rollover increment must be >= 0, got {0}")]
    RolloverIncrement(Decimal),

    #[error("reset floor must be > 0, got {0}")]
    ResetFloor(Decimal),

    #[error("min threshold must be > 0, got {0}")]
    MinThreshold(Decimal),

    #[error("step increment must be > 0, got {0}")]
    StepIncrement(Decimal),

    #[error("step increment set without a min threshold")]
    StepWithoutMin,

    #[error("invalid draw time '{0}' (expected HH:MM)")]
    DrawTime(String),

    #[error("invalid draw day '{0}'")]
    DrawDay(String),

    #[error("no draw days configured")]
    NoDrawDays,

    #[error("invalid UTC offset {0} minutes")]
    UtcOffset(i32),
}

impl RawGameConfig {
    /// Validate into a [`GameConfig`], applying app-wide EV defaults.
    pub fn validate(&self, id: &str, defaults: &EvDefaults) -> Result<GameConfig, ConfigError> {
        if self.odds == 0 {
            return Err(ConfigError::ZeroOdds);
        }
        if self.ticket_cost <= Decimal::ZERO {
            return Err(ConfigError::TicketCost(self.ticket_cost));
        }

        let tax_rate = self.tax_rate.unwrap_or(defaults.tax_rate);
        if tax_rate < Decimal::ZERO || tax_rate >= Decimal::ONE {
            return Err(ConfigError::TaxRate(tax_rate));
        }
        let lump_sum_factor = self.lump_sum_factor.unwrap_or(defaults.lump_sum_factor);
        if lump_sum_factor <= Decimal::ZERO || lump_sum_factor > Decimal::ONE {
            return Err(ConfigError::LumpSumFactor(lump_sum_factor));
        }

        if self.secondary_prize_ev < Decimal::ZERO {
            return Err(ConfigError::SecondaryEv(self.secondary_prize_ev));
        }
        if self.rollover_increment < Decimal::ZERO {
            return Err(ConfigError::RolloverIncrement(self.rollover_increment));
        }
        if let Some(floor) = self.reset_floor {
            if floor <= Decimal::ZERO {
                return Err(ConfigError::ResetFloor(floor));
            }
        }

        match (self.min_threshold, self.step_increment) {
            (None, Some(_)) => return Err(ConfigError::StepWithoutMin),
            (Some(min), _) if min <= Decimal::ZERO => return Err(ConfigError::MinThreshold(min)),
            (_, Some(step)) if step <= Decimal::ZERO => {
                return Err(ConfigError::StepIncrement(step))
            }
            _ => {}
        }

        let schedule = self.parse_schedule()?;

        let secondary_prize_ev = if defaults.include_secondary_prizes {
            self.secondary_prize_ev
        } else {
            Decimal::ZERO
        };

        Ok(GameConfig {
            id: id.to_string(),
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            ticket_cost: self.ticket_cost,
            odds: self.odds,
            secondary_prize_ev,
            tax_rate,
            lump_sum_factor,
            rollover_increment: self.rollover_increment,
            reset_floor: self.reset_floor,
            threshold_operator: self.threshold_operator,
            min_threshold: self.min_threshold,
            step_increment: self.step_increment,
            schedule,
            automation_eligible: self.automation_eligible,
            momentum_baseline: self.momentum_baseline,
        })
    }

    fn parse_schedule(&self) -> Result<DrawSchedule, ConfigError> {
        let time = NaiveTime::parse_from_str(self.draw_time.trim(), "%H:%M")
            .map_err(|_| ConfigError::DrawTime(self.draw_time.clone()))?;

        let mut days: Vec<Weekday> = Vec::new();
        for raw in &self.draw_days {
            if raw.eq_ignore_ascii_case("daily") {
                days = ALL_WEEKDAYS.to_vec();
                break;
            }
            let day = Weekday::from_str(raw.trim()).map_err(|_| ConfigError::DrawDay(raw.clone()))?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        if days.is_empty() {
            return Err(ConfigError::NoDrawDays);
        }
        days.sort_by_key(|d| d.num_days_from_monday());

        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::UtcOffset(self.utc_offset_minutes))?;

        Ok(DrawSchedule {
            days,
            time,
            utc_offset,
        })
    }
}

pub const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Outcome of validating every enabled game table.
#[derive(Debug, Clone, Default)]
pub struct ValidatedGames {
    pub games: BTreeMap<String, GameConfig>,
    pub rejected: BTreeMap<String, ConfigError>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply the environment layer. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EV_THRESHOLD") {
            self.engine.ev_threshold = Decimal::from_str(v.trim())
                .with_context(|| format!("Invalid EV_THRESHOLD: {v}"))?;
        }
        if let Some(v) = lookup("JACKPOT_STATE_FILE") {
            self.storage.path = v;
        }
        if let Some(v) = lookup("JACKPOT_DRAW_WINDOW_MINUTES") {
            self.engine.draw_window_minutes = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid JACKPOT_DRAW_WINDOW_MINUTES: {v}"))?;
        }
        if let Some(v) = lookup("JACKPOT_DASHBOARD_PORT") {
            self.dashboard.port = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid JACKPOT_DASHBOARD_PORT: {v}"))?;
        }
        Ok(())
    }

    /// Validate all enabled games. Disabled games are skipped silently.
    pub fn validate_games(&self) -> ValidatedGames {
        let mut out = ValidatedGames::default();
        for (id, raw) in &self.games {
            if !raw.enabled {
                continue;
            }
            match raw.validate(id, &self.ev) {
                Ok(game) => {
                    out.games.insert(id.clone(), game);
                }
                Err(e) => {
                    out.rejected.insert(id.clone(), e);
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
