//! Memory types for Confidant.
//!
//! `Memory` is the per-user conversational record: a capped thread of turns,
//! a deduplicated set of durable facts, and the throttle state of idle nudges.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Author of a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role,
            text: text.into(),
            at,
        }
    }
}

/// Per-user conversational memory.
///
/// Invariants maintained by the mutators below:
/// - `thread` never exceeds the cap passed to [`Memory::push_turn`].
/// - `facts` holds no two entries with the same [`normalize_fact`] key.
/// - `nudge_count_today` only counts for the UTC day of `last_nudge_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub thread: Vec<Turn>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_nudge_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nudge_count_today: u32,
}

impl Memory {
    /// Create an empty memory for a first-time visitor.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            facts: Vec::new(),
            thread: Vec::new(),
            first_seen_at: now,
            last_seen_at: now,
            last_nudge_at: None,
            nudge_count_today: 0,
        }
    }

    /// Append a turn and drop the oldest entries beyond `cap`.
    pub fn push_turn(&mut self, turn: Turn, cap: usize) {
        self.last_seen_at = turn.at;
        self.thread.push(turn);
        if self.thread.len() > cap {
            let overflow = self.thread.len() - cap;
            self.thread.drain(..overflow);
        }
    }

    /// Merge a fact into the set. Returns `true` if the set changed.
    ///
    /// Facts are compared by their normalized form; the first-seen spelling
    /// (trimmed, inner whitespace collapsed) is kept.
    pub fn add_fact(&mut self, raw: &str) -> bool {
        let key = normalize_fact(raw);
        if key.is_empty() {
            return false;
        }
        if self.facts.iter().any(|f| normalize_fact(f) == key) {
            return false;
        }
        self.facts.push(collapse_whitespace(raw));
        true
    }

    /// Timestamp of the last thread activity, or first contact if the thread is empty.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.thread
            .last()
            .map(|t| t.at)
            .unwrap_or(self.first_seen_at)
    }

    /// Most recent assistant turn, if any.
    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.thread
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
    }

    /// Texts of the last `n` assistant turns, oldest first.
    pub fn recent_assistant_lines(&self, n: usize) -> Vec<&str> {
        let mut lines: Vec<&str> = self
            .thread
            .iter()
            .rev()
            .filter(|t| t.role == TurnRole::Assistant && !t.text.trim().is_empty())
            .take(n)
            .map(|t| t.text.as_str())
            .collect();
        lines.reverse();
        lines
    }

    /// Nudges counted for the UTC day of `now`. A count from an earlier day reads as zero.
    pub fn nudges_on(&self, now: DateTime<Utc>) -> u32 {
        match self.last_nudge_at {
            Some(last) if utc_day(last) == utc_day(now) => self.nudge_count_today,
            _ => 0,
        }
    }

    /// Record a nudge sent at `now`, resetting the counter on a new UTC day.
    pub fn record_nudge(&mut self, now: DateTime<Utc>) {
        self.nudge_count_today = self.nudges_on(now) + 1;
        self.last_nudge_at = Some(now);
    }

    pub fn view(&self) -> MemoryView {
        MemoryView {
            facts: self.facts.clone(),
            thread_len: self.thread.len(),
            last_seen_at: self.last_seen_at,
        }
    }
}

/// Compact projection of a [`Memory`] returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryView {
    pub facts: Vec<String>,
    pub thread_len: usize,
    pub last_seen_at: DateTime<Utc>,
}

/// Comparison key of a fact: trimmed, whitespace collapsed, lowercased.
pub fn normalize_fact(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn utc_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}
