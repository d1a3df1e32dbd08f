// src/stats/tables.rs

//! One period's worth of statistics: a fixed set of named rows known up
//! front (e.g. "get", "set", "delete"), plus a managed set keyed by names
//! only known at runtime (e.g. one row per backend server).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::stats::accumulator::{AccumulatorRow, AccumulatorSnapshot};
use crate::stats::counter::CounterRow;

/// A table of accumulator rows, combining a fixed pre-registered set with a
/// managed set that grows as new keys are seen.
pub struct AccumulatorTable {
    fixed: HashMap<&'static str, AccumulatorRow>,
    managed: RwLock<HashMap<String, AccumulatorRow>>,
}

impl AccumulatorTable {
    pub fn new(fixed_names: &[&'static str]) -> Self {
        Self {
            fixed: fixed_names.iter().map(|&n| (n, AccumulatorRow::new())).collect(),
            managed: RwLock::new(HashMap::new()),
        }
    }

    /// Records `value` against `name`, creating a managed row on first use
    /// if `name` isn't one of the fixed names.
    pub fn accumulate(&self, name: &str, value: i64) {
        if let Some(row) = self.fixed.get(name) {
            row.accumulate(value);
            return;
        }

        {
            let managed = self.managed.read().expect("stats table lock poisoned");
            if let Some(row) = managed.get(name) {
                row.accumulate(value);
                return;
            }
        }

        let mut managed = self.managed.write().expect("stats table lock poisoned");
        managed
            .entry(name.to_string())
            .or_insert_with(AccumulatorRow::new)
            .accumulate(value);
    }

    pub fn snapshot(&self, name: &str) -> Option<AccumulatorSnapshot> {
        if let Some(row) = self.fixed.get(name) {
            return Some(row.snapshot());
        }
        self.managed
            .read()
            .expect("stats table lock poisoned")
            .get(name)
            .map(|row| row.snapshot())
    }

    pub fn reset(&self) {
        for row in self.fixed.values() {
            row.reset();
        }
        for row in self.managed.read().expect("stats table lock poisoned").values() {
            row.reset();
        }
    }
}

/// A table of plain counters, same fixed/managed split as `AccumulatorTable`.
pub struct CounterTable {
    fixed: HashMap<&'static str, CounterRow>,
    managed: RwLock<HashMap<String, CounterRow>>,
}

impl CounterTable {
    pub fn new(fixed_names: &[&'static str]) -> Self {
        Self {
            fixed: fixed_names.iter().map(|&n| (n, CounterRow::new())).collect(),
            managed: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment(&self, name: &str) {
        if let Some(row) = self.fixed.get(name) {
            row.increment();
            return;
        }

        {
            let managed = self.managed.read().expect("stats table lock poisoned");
            if let Some(row) = managed.get(name) {
                row.increment();
                return;
            }
        }

        let mut managed = self.managed.write().expect("stats table lock poisoned");
        managed.entry(name.to_string()).or_insert_with(CounterRow::new).increment();
    }

    pub fn get(&self, name: &str) -> u64 {
        if let Some(row) = self.fixed.get(name) {
            return row.get();
        }
        self.managed
            .read()
            .expect("stats table lock poisoned")
            .get(name)
            .map(|row| row.get())
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        for row in self.fixed.values() {
            row.reset();
        }
        for row in self.managed.read().expect("stats table lock poisoned").values() {
            row.reset();
        }
    }
}
