//! Draw-schedule arithmetic.
//!
//! Draws happen on a set of weekdays at a fixed local time in the game's
//! UTC offset. Everything here is computed from an explicit `now` so the
//! orchestrator and reminder pass stay deterministic under test.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;

use crate::config::DrawSchedule;

/// What a scheduled check is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Fetch the new jackpot shortly after a draw.
    PostDraw,
    /// Re-check active buy signals ahead of a draw.
    Reminder,
}

/// One entry of the weekly check plan, in the game's local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledCheck {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub kind: CheckKind,
}

impl DrawSchedule {
    fn draw_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if !self.days.contains(&date.weekday()) {
            return None;
        }
        self.utc_offset
            .from_local_datetime(&date.and_time(self.time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// First draw at or after `now`.
    pub fn next_draw(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.utc_offset).date_naive();
        (0..=7)
            .filter_map(|d| self.draw_on(today + Duration::days(d)))
            .find(|draw| *draw >= now)
    }

    /// Most recent draw strictly before `now`.
    pub fn previous_draw(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.utc_offset).date_naive();
        (0..=7)
            .filter_map(|d| self.draw_on(today - Duration::days(d)))
            .find(|draw| *draw < now)
    }

    pub fn minutes_to_next_draw(&self, now: DateTime<Utc>) -> Option<i64> {
        self.next_draw(now).map(|draw| (draw - now).num_minutes())
    }

    /// Whether `now` is within `window_minutes` of the previous or next draw.
    pub fn is_near_draw(&self, now: DateTime<Utc>, window_minutes: i64) -> bool {
        let window = Duration::minutes(window_minutes);
        let near_next = self.next_draw(now).is_some_and(|d| d - now <= window);
        let near_prev = self.previous_draw(now).is_some_and(|d| now - d <= window);
        near_next || near_prev
    }

    /// Whether the next draw is `lead ± tolerance` minutes away.
    pub fn in_reminder_window(&self, now: DateTime<Utc>, lead: i64, tolerance: i64) -> bool {
        self.minutes_to_next_draw(now)
            .is_some_and(|m| (lead - tolerance..=lead + tolerance).contains(&m))
    }

    /// Weekly check plan: a post-draw check `post_draw_minutes` after every
    /// draw and a reminder check `reminder_lead_minutes` before it, sorted
    /// Monday first.
    pub fn check_plan(&self, post_draw_minutes: i64, reminder_lead_minutes: i64) -> Vec<ScheduledCheck> {
        let mut plan = Vec::with_capacity(self.days.len() * 2);
        for day in &self.days {
            // Any concrete week works; shifted times may wrap into a neighbouring day
            let Some(date) = NaiveDate::from_isoywd_opt(2024, 1, *day) else {
                continue;
            };
            let draw = date.and_time(self.time);
            for (kind, at) in [
                (CheckKind::PostDraw, draw + Duration::minutes(post_draw_minutes)),
                (CheckKind::Reminder, draw - Duration::minutes(reminder_lead_minutes)),
            ] {
                plan.push(ScheduledCheck {
                    weekday: at.weekday(),
                    time: at.time(),
                    kind,
                });
            }
        }
        plan.sort_by_key(|c| (c.weekday.num_days_from_monday(), c.time));
        plan.dedup();
        plan
    }
}

/// Human text for the time remaining until a draw.
pub fn format_time_to_draw(until: Duration) -> String {
    if until < Duration::zero() {
        return "Draw passed".to_string();
    }
    let minutes = until.num_minutes();
    match (minutes / 60, minutes % 60) {
        (0, 0) => "Less than 1m".to_string(),
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
