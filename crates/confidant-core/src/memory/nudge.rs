//! Server-side idle nudge policy.
//!
//! The decision is a pure function of a [`Memory`] snapshot and the current
//! time. It is the only authority on whether a nudge may go out; client
//! timers merely avoid asking too often.

use chrono::{DateTime, Duration, Utc};

use confidant_types::config::NudgeConfig;
use confidant_types::memory::Memory;

/// Phrases that mark an assistant line as an earlier check-in.
const CHECK_IN_MARKERS: &[&str] = &[
    "still there",
    "checking in",
    "just checking",
    "thinking of you",
    "are you there",
    "you around",
];

/// Longest gap or cool-down honoured; larger settings are clamped to it.
const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgePolicy {
    pub min_gap: Duration,
    pub cooldown: Duration,
    pub max_per_day: u32,
}

impl NudgePolicy {
    pub fn from_config(config: &NudgeConfig) -> Self {
        Self {
            min_gap: window(config.min_gap_ms),
            cooldown: window(config.cooldown_ms),
            max_per_day: config.max_per_day,
        }
    }
}

fn window(ms: u64) -> Duration {
    // Fits in i64 after the clamp.
    Duration::milliseconds(ms.min(MAX_WINDOW_MS) as i64)
}

impl Default for NudgePolicy {
    fn default() -> Self {
        Self::from_config(&NudgeConfig::default())
    }
}

/// Outcome of the policy, with the rule that denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDecision {
    Allow,
    /// The user was active less than `min_gap` ago.
    TooSoon,
    /// A check-in already went out within the cool-down.
    RecentCheckIn,
    /// `max_per_day` nudges were already sent on this UTC day.
    DailyCapReached,
}

impl NudgeDecision {
    pub fn allowed(self) -> bool {
        self == NudgeDecision::Allow
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NudgeDecision::Allow => "allow",
            NudgeDecision::TooSoon => "too_soon",
            NudgeDecision::RecentCheckIn => "recent_check_in",
            NudgeDecision::DailyCapReached => "daily_cap_reached",
        }
    }
}

pub fn evaluate(memory: &Memory, now: DateTime<Utc>, policy: &NudgePolicy) -> NudgeDecision {
    if now - memory.last_activity_at() < policy.min_gap {
        return NudgeDecision::TooSoon;
    }

    let within_cooldown = |at: DateTime<Utc>| now - at < policy.cooldown;
    let last_line_was_check_in = memory
        .last_assistant_turn()
        .is_some_and(|turn| looks_like_check_in(&turn.text) && within_cooldown(turn.at));
    if last_line_was_check_in || memory.last_nudge_at.is_some_and(within_cooldown) {
        return NudgeDecision::RecentCheckIn;
    }

    if memory.nudges_on(now) >= policy.max_per_day {
        return NudgeDecision::DailyCapReached;
    }

    NudgeDecision::Allow
}

/// Whether a nudge may be sent now. Has no side effects.
pub fn can_nudge(memory: &Memory, now: DateTime<Utc>, policy: &NudgePolicy) -> bool {
    evaluate(memory, now, policy).allowed()
}

pub fn looks_like_check_in(text: &str) -> bool {
    let lower = text.to_lowercase();
    CHECK_IN_MARKERS.iter().any(|m| lower.contains(m))
}
