// src/stats/accumulator.rs

//! A single statistics row that accumulates count/sum/sum-of-squares plus a
//! running high/low water mark, all lock-free.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Accumulates samples of a latency-like measurement: enough to report a
/// mean, a variance, and the extremes observed in the period.
#[derive(Debug, Default)]
pub struct AccumulatorRow {
    count: AtomicU64,
    sum: AtomicI64,
    sumsq: AtomicU64,
    hwm: AtomicI64,
    lwm: AtomicI64,
}

/// A read-only snapshot of an `AccumulatorRow` at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorSnapshot {
    pub count: u64,
    pub sum: i64,
    pub sumsq: u64,
    pub hwm: i64,
    pub lwm: i64,
}

impl AccumulatorSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            let mean = self.mean();
            (self.sumsq as f64 / self.count as f64) - mean * mean
        }
    }
}

impl AccumulatorRow {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicI64::new(0),
            sumsq: AtomicU64::new(0),
            hwm: AtomicI64::new(i64::MIN),
            lwm: AtomicI64::new(i64::MAX),
        }
    }

    /// Records one sample.
    pub fn accumulate(&self, value: i64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.sumsq.fetch_add((value * value) as u64, Ordering::Relaxed);
        cas_max(&self.hwm, value);
        cas_min(&self.lwm, value);
    }

    pub fn snapshot(&self) -> AccumulatorSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        AccumulatorSnapshot {
            count,
            sum: self.sum.load(Ordering::Relaxed),
            sumsq: self.sumsq.load(Ordering::Relaxed),
            hwm: if count == 0 { 0 } else { self.hwm.load(Ordering::Relaxed) },
            lwm: if count == 0 { 0 } else { self.lwm.load(Ordering::Relaxed) },
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.sumsq.store(0, Ordering::Relaxed);
        self.hwm.store(i64::MIN, Ordering::Relaxed);
        self.lwm.store(i64::MAX, Ordering::Relaxed);
    }
}

fn cas_max(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

fn cas_min(cell: &AtomicI64, value: i64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value < current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}
