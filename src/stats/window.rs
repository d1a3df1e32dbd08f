// src/stats/window.rs

//! Double-buffered time periods: a "current" period that's still
//! accumulating, and the last complete "previous" period, swapped whenever
//! wall-clock time crosses into a new `interval_secs`-sized bucket.

use std::sync::Mutex;

use crate::stats::tables::{AccumulatorTable, CounterTable};

/// One period's accumulator and counter tables.
pub struct Period {
    pub accumulators: AccumulatorTable,
    pub counters: CounterTable,
}

impl Period {
    fn new(accumulator_names: &[&'static str], counter_names: &[&'static str]) -> Self {
        Self {
            accumulators: AccumulatorTable::new(accumulator_names),
            counters: CounterTable::new(counter_names),
        }
    }
}

struct Buffers {
    tick: u64,
    current: Period,
    previous: Period,
}

/// Maintains a rolling current/previous pair of [`Period`]s for one
/// reporting interval (e.g. 5 seconds, or 5 minutes).
pub struct CurrentAndPrevious {
    interval_secs: u64,
    accumulator_names: Vec<&'static str>,
    counter_names: Vec<&'static str>,
    buffers: Mutex<Buffers>,
}

impl CurrentAndPrevious {
    pub fn new(interval_secs: u64, accumulator_names: &[&'static str], counter_names: &[&'static str]) -> Self {
        Self {
            interval_secs,
            accumulator_names: accumulator_names.to_vec(),
            counter_names: counter_names.to_vec(),
            buffers: Mutex::new(Buffers {
                tick: 0,
                current: Period::new(accumulator_names, counter_names),
                previous: Period::new(accumulator_names, counter_names),
            }),
        }
    }

    fn tick_for(&self, now_secs: u64) -> u64 {
        now_secs / self.interval_secs
    }

    /// Advances the window if `now_secs` has moved into a new tick, rolling
    /// the current period into `previous` and starting a fresh one.
    fn advance(&self, now_secs: u64) -> std::sync::MutexGuard<'_, Buffers> {
        let mut buffers = self.buffers.lock().expect("stats window lock poisoned");
        let tick = self.tick_for(now_secs);
        if tick > buffers.tick {
            let fresh = Period::new(&self.accumulator_names, &self.counter_names);
            let finished = std::mem::replace(&mut buffers.current, fresh);
            buffers.previous = finished;
            buffers.tick = tick;
        }
        buffers
    }

    /// Runs `f` against the current (still-accumulating) period.
    pub fn with_current<R>(&self, now_secs: u64, f: impl FnOnce(&Period) -> R) -> R {
        let buffers = self.advance(now_secs);
        f(&buffers.current)
    }

    /// Runs `f` against the previous (fully closed) period.
    pub fn with_previous<R>(&self, now_secs: u64, f: impl FnOnce(&Period) -> R) -> R {
        let buffers = self.advance(now_secs);
        f(&buffers.previous)
    }
}
