// src/stats/mod.rs

//! Time-bucketed rolling statistics for the replicated client: per-operation
//! latency accumulators and counters, rolled over a 5-second and a
//! 5-minute window.

pub mod accumulator;
pub mod counter;
pub mod tables;
pub mod window;

use std::time::{SystemTime, UNIX_EPOCH};

use window::{CurrentAndPrevious, Period};

const SHORT_INTERVAL_SECS: u64 = 5;
const LONG_INTERVAL_SECS: u64 = 300;

const ACCUMULATOR_NAMES: &[&str] = &["get_latency_us", "set_latency_us", "delete_latency_us"];
const COUNTER_NAMES: &[&str] = &["get", "set", "delete", "get_not_found", "set_contention"];

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Aggregates client-side call statistics over two rolling windows and
/// exposes the three views callers (monitoring hooks, status pages) read:
/// the last complete 5-second period, the in-progress 5-minute period, and
/// the last complete 5-minute period.
pub struct StatsEngine {
    short: CurrentAndPrevious,
    long: CurrentAndPrevious,
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsEngine {
    pub fn new() -> Self {
        Self {
            short: CurrentAndPrevious::new(SHORT_INTERVAL_SECS, ACCUMULATOR_NAMES, COUNTER_NAMES),
            long: CurrentAndPrevious::new(LONG_INTERVAL_SECS, ACCUMULATOR_NAMES, COUNTER_NAMES),
        }
    }

    pub fn record_latency(&self, name: &str, micros: i64) {
        let now = now_secs();
        self.short.with_current(now, |p| p.accumulators.accumulate(name, micros));
        self.long.with_current(now, |p| p.accumulators.accumulate(name, micros));
    }

    pub fn increment(&self, name: &str) {
        let now = now_secs();
        self.short.with_current(now, |p| p.counters.increment(name));
        self.long.with_current(now, |p| p.counters.increment(name));
    }

    /// The last complete 5-second period.
    pub fn previous_5s<R>(&self, f: impl FnOnce(&Period) -> R) -> R {
        self.short.with_previous(now_secs(), f)
    }

    /// The in-progress 5-minute period.
    pub fn current_5m<R>(&self, f: impl FnOnce(&Period) -> R) -> R {
        self.long.with_current(now_secs(), f)
    }

    /// The last complete 5-minute period.
    pub fn previous_5m<R>(&self, f: impl FnOnce(&Period) -> R) -> R {
        self.long.with_previous(now_secs(), f)
    }
}
