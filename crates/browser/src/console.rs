//! Console message queries: time/level/count scoping plus browser-vs-server
//! time sync so callers can translate their own timestamps.

use std::time::Duration;

use bmcps_core::{Error, Result};
use crate::driver::BrowserDriver;
use crate::state::ConsoleEntry;
use crate::util::now_ms;

/// Cumulative settle time before reading the ring, giving freshly posted
/// console events a chance to cross the socket.
const DRAIN_TOTAL: Duration = Duration::from_millis(1000);
const DRAIN_SLICES: u32 = 4;

pub const MAX_ENTRIES_DEFAULT: usize = 500;
const ONE_DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimeScope {
    #[default]
    None,
    LastDuration {
        value: i64,
        unit: DurationUnit,
    },
    Range {
        from_ms: i64,
        to_ms: i64,
    },
    FromOnwards {
        from_ms: i64,
    },
    Until {
        to_ms: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

impl DurationUnit {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "milliseconds" => Ok(Self::Milliseconds),
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            other => Err(Error::Tool(format!("Unknown duration unit: {other}"))),
        }
    }

    fn to_ms(self, value: i64) -> i64 {
        match self {
            Self::Milliseconds => value,
            Self::Seconds => value.saturating_mul(1000),
            Self::Minutes => value.saturating_mul(60_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelScope {
    /// Keep entries at or above the given rank.
    MinLevel(String),
    /// Keep exactly the listed levels.
    Only(Vec<String>),
}

impl Default for LevelScope {
    fn default() -> Self {
        Self::MinLevel("info".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountScope {
    pub max_entries: i64,
    pub order: Order,
}

impl Default for CountScope {
    fn default() -> Self {
        Self {
            max_entries: MAX_ENTRIES_DEFAULT as i64,
            order: Order::NewestFirst,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleQuery {
    pub time_scope: TimeScope,
    pub count_scope: CountScope,
    pub level_scope: LevelScope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeSync {
    pub browser_now_ms: i64,
    pub server_now_ms: i64,
    pub offset_ms: i64,
    pub round_trip_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleQueryResult {
    pub lines: Vec<String>,
    pub returned: usize,
    pub total_matching: usize,
    pub truncated: bool,
    pub time_sync: TimeSync,
}

/// Severity rank: debug < log < info < warning < error. Unknown levels rank
/// with log.
fn level_rank(level: &str) -> u8 {
    match level {
        "debug" => 0,
        "log" => 1,
        "info" => 2,
        "warning" => 3,
        "error" => 4,
        _ => 1,
    }
}

impl BrowserDriver {
    /// Sample `Date.now()` in the page against the wall clock. The round
    /// trip bounds how stale the browser sample is.
    pub async fn time_sync(&self) -> Result<TimeSync> {
        let before_ms = now_ms();
        let value = self
            .evaluate_value("Date.now()", false, Duration::from_secs(5))
            .await?;
        let after_ms = now_ms();

        let browser_now_ms = value
            .as_f64()
            .map(|v| v as i64)
            .or_else(|| value.as_i64())
            .ok_or_else(|| Error::Protocol("Date.now() returned a non-number".to_string()))?;

        Ok(TimeSync {
            browser_now_ms,
            server_now_ms: after_ms,
            offset_ms: browser_now_ms - after_ms,
            round_trip_ms: after_ms - before_ms,
        })
    }

    pub async fn get_console_messages(&self, query: &ConsoleQuery) -> Result<ConsoleQueryResult> {
        self.require_session()?;
        let time_sync = self.time_sync().await?;

        // Let in-flight console events land before the snapshot.
        for _ in 0..DRAIN_SLICES {
            tokio::time::sleep(DRAIN_TOTAL / DRAIN_SLICES).await;
        }

        let snapshot = self.state().console_snapshot();
        let mut result = apply_scopes(snapshot, query, time_sync.server_now_ms);
        result.time_sync = time_sync;
        Ok(result)
    }
}

/// Pure scope application: level filter, time window, order, truncation.
/// Entries arrive oldest-first (ring order).
pub fn apply_scopes(
    entries: Vec<ConsoleEntry>,
    query: &ConsoleQuery,
    server_now_ms: i64,
) -> ConsoleQueryResult {
    let level_matches = |entry: &ConsoleEntry| match &query.level_scope {
        LevelScope::MinLevel(min) => level_rank(&entry.level) >= level_rank(min),
        LevelScope::Only(levels) => levels.iter().any(|level| level == &entry.level),
    };

    let window = match &query.time_scope {
        TimeScope::None => None,
        TimeScope::LastDuration { value, unit } => {
            let delta = unit.to_ms(*value);
            Some((server_now_ms - delta, server_now_ms))
        }
        TimeScope::Range { from_ms, to_ms } => Some((*from_ms, *to_ms)),
        TimeScope::FromOnwards { from_ms } => Some((*from_ms, server_now_ms + ONE_DAY_MS)),
        TimeScope::Until { to_ms } => Some((0, *to_ms)),
    };
    let time_matches = |entry: &ConsoleEntry| match window {
        Some((from, to)) => entry.timestamp_ms >= from && entry.timestamp_ms <= to,
        None => true,
    };

    let mut matching: Vec<ConsoleEntry> = entries
        .into_iter()
        .filter(|entry| level_matches(entry) && time_matches(entry))
        .collect();

    if query.count_scope.order == Order::NewestFirst {
        matching.reverse();
    }

    let total_matching = matching.len();
    let max_entries = query.count_scope.max_entries.max(1) as usize;
    let truncated = total_matching > max_entries;
    matching.truncate(max_entries);

    let lines: Vec<String> = matching
        .iter()
        .map(|entry| format!("[{}] {}", entry.level, entry.text))
        .collect();

    ConsoleQueryResult {
        returned: lines.len(),
        lines,
        total_matching,
        truncated,
        time_sync: TimeSync::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp_ms: i64, level: &str, text: &str) -> ConsoleEntry {
        ConsoleEntry {
            timestamp_ms,
            level: level.to_string(),
            text: text.to_string(),
        }
    }

    fn sample() -> Vec<ConsoleEntry> {
        vec![
            entry(1000, "log", "a"),
            entry(2000, "error", "b"),
            entry(3000, "debug", "c"),
            entry(4000, "warning", "d"),
            entry(5000, "info", "e"),
        ]
    }

    #[test]
    fn min_level_filter_uses_rank_order() {
        let query = ConsoleQuery {
            level_scope: LevelScope::MinLevel("warning".to_string()),
            count_scope: CountScope {
                max_entries: 10,
                order: Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(sample(), &query, 10_000);
        assert_eq!(result.lines, ["[warning] d", "[error] b"]);
        assert_eq!(result.total_matching, 2);
        assert!(!result.truncated);
    }

    #[test]
    fn only_filter_matches_exact_levels() {
        let query = ConsoleQuery {
            level_scope: LevelScope::Only(vec!["log".to_string(), "debug".to_string()]),
            count_scope: CountScope {
                max_entries: 10,
                order: Order::OldestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(sample(), &query, 10_000);
        assert_eq!(result.lines, ["[log] a", "[debug] c"]);
    }

    #[test]
    fn last_duration_window() {
        let query = ConsoleQuery {
            time_scope: TimeScope::LastDuration {
                value: 3,
                unit: DurationUnit::Seconds,
            },
            level_scope: LevelScope::MinLevel("debug".to_string()),
            count_scope: CountScope {
                max_entries: 10,
                order: Order::OldestFirst,
            },
        };
        // now = 5000 -> window [2000, 5000]
        let result = apply_scopes(sample(), &query, 5000);
        assert_eq!(result.lines.len(), 4);
        assert_eq!(result.lines[0], "[error] b");
    }

    #[test]
    fn range_from_onwards_until_windows() {
        let base = ConsoleQuery {
            level_scope: LevelScope::MinLevel("debug".to_string()),
            count_scope: CountScope {
                max_entries: 10,
                order: Order::OldestFirst,
            },
            ..Default::default()
        };

        let mut query = base.clone();
        query.time_scope = TimeScope::Range {
            from_ms: 2000,
            to_ms: 4000,
        };
        assert_eq!(apply_scopes(sample(), &query, 99_999).total_matching, 3);

        let mut query = base.clone();
        query.time_scope = TimeScope::FromOnwards { from_ms: 4000 };
        assert_eq!(apply_scopes(sample(), &query, 99_999).total_matching, 2);

        let mut query = base;
        query.time_scope = TimeScope::Until { to_ms: 1999 };
        assert_eq!(apply_scopes(sample(), &query, 99_999).total_matching, 1);
    }

    #[test]
    fn truncation_law() {
        // truncated <=> total_matching > max_entries, returned = min(total, max)
        let query = ConsoleQuery {
            level_scope: LevelScope::MinLevel("debug".to_string()),
            count_scope: CountScope {
                max_entries: 2,
                order: Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(sample(), &query, 10_000);
        assert_eq!(result.total_matching, 5);
        assert_eq!(result.returned, 2);
        assert!(result.truncated);
        // Newest first: e then d.
        assert_eq!(result.lines, ["[info] e", "[warning] d"]);

        let query_all = ConsoleQuery {
            level_scope: LevelScope::MinLevel("debug".to_string()),
            count_scope: CountScope {
                max_entries: 5,
                order: Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(sample(), &query_all, 10_000);
        assert_eq!(result.returned, result.total_matching);
        assert!(!result.truncated);
    }

    #[test]
    fn max_entries_floor_is_one() {
        let query = ConsoleQuery {
            level_scope: LevelScope::MinLevel("debug".to_string()),
            count_scope: CountScope {
                max_entries: 0,
                order: Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(sample(), &query, 10_000);
        assert_eq!(result.returned, 1);
        assert!(result.truncated);
    }

    #[test]
    fn spec_scenario_min_level_warning() {
        // console.log("a"); console.error("b") with min_level=warning.
        let entries = vec![entry(100, "log", "a"), entry(200, "error", "b")];
        let query = ConsoleQuery {
            level_scope: LevelScope::MinLevel("warning".to_string()),
            count_scope: CountScope {
                max_entries: 10,
                order: Order::NewestFirst,
            },
            ..Default::default()
        };
        let result = apply_scopes(entries, &query, 10_000);
        assert_eq!(result.lines, ["[error] b"]);
        assert_eq!(result.total_matching, 1);
        assert!(!result.truncated);
    }
}
