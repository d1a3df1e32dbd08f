// src/core/comm_monitor.rs

//! Tracks per-server communication health and raises/clears an alarm once a
//! run of consecutive successes or failures has lasted long enough to be
//! meaningful, rather than flapping on every individual call.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum duration a failure streak must persist before the alarm raises,
/// and a success streak must persist before it clears.
const ALARM_HYSTERESIS_MS: i64 = 5_000;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Receives alarm transitions from a [`CommMonitor`]. Kept as a trait so
/// tests can observe transitions without wiring real alerting.
pub trait AlarmSink: Send + Sync {
    fn set_alarm(&self, server: &str);
    fn clear_alarm(&self, server: &str);
}

/// An `AlarmSink` that does nothing, for callers that don't care about
/// alarms (or haven't wired one up yet).
pub struct NullAlarmSink;

impl AlarmSink for NullAlarmSink {
    fn set_alarm(&self, _server: &str) {}
    fn clear_alarm(&self, _server: &str) {}
}

impl AlarmSink for Box<dyn AlarmSink> {
    fn set_alarm(&self, server: &str) {
        (**self).set_alarm(server);
    }
    fn clear_alarm(&self, server: &str) {
        (**self).clear_alarm(server);
    }
}

/// Counts successes and failures reported against one server and raises or
/// clears an alarm once a streak has persisted for [`ALARM_HYSTERESIS_MS`].
pub struct CommMonitor<A: AlarmSink> {
    identity: String,
    succeeded: AtomicU64,
    failed: AtomicU64,
    streak_started_ms: AtomicI64,
    streak_is_failure: std::sync::atomic::AtomicBool,
    alarm_raised: std::sync::atomic::AtomicBool,
    sink: A,
}

impl<A: AlarmSink> CommMonitor<A> {
    pub fn new(identity: impl Into<String>, sink: A) -> Self {
        Self {
            identity: identity.into(),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            streak_started_ms: AtomicI64::new(now_ms()),
            streak_is_failure: std::sync::atomic::AtomicBool::new(false),
            alarm_raised: std::sync::atomic::AtomicBool::new(false),
            sink,
        }
    }

    pub fn inform_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.track_communication_change(false, now_ms());
    }

    pub fn inform_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.track_communication_change(true, now_ms());
    }

    pub fn successes(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn track_communication_change(&self, is_failure: bool, now_ms: i64) {
        let was_failure = self.streak_is_failure.swap(is_failure, Ordering::SeqCst);
        if was_failure != is_failure {
            self.streak_started_ms.store(now_ms, Ordering::SeqCst);
            return;
        }

        let streak_started = self.streak_started_ms.load(Ordering::SeqCst);
        if now_ms - streak_started < ALARM_HYSTERESIS_MS {
            return;
        }

        if is_failure && !self.alarm_raised.swap(true, Ordering::SeqCst) {
            self.sink.set_alarm(&self.identity);
        } else if !is_failure && self.alarm_raised.swap(false, Ordering::SeqCst) {
            self.sink.clear_alarm(&self.identity);
        }
    }
}
