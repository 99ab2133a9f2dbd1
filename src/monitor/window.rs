//! Per-family sliding-window event log for failure-rate computation
//!
//! Each emitted metric is classified as failure, success, or neutral from its
//! name and tags, then appended to the window for its metric family (the
//! prefix before the first `.`). Windows retain only events younger than the
//! horizon; eviction happens lazily on every append and read, so there is no
//! background sweeper and no unbounded growth. Rates are approximate by
//! design: concurrent appenders contend only on their family's shard.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

use crate::constants::{METRIC_RATE_FLOOR, METRIC_WINDOW_MAX_EVENTS, METRIC_WINDOW_SECS};

/// Outcome classification for a single metric emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Failure,
    Success,
    /// Not a success/failure signal; excluded from rate computation
    Neutral,
}

/// Snapshot of a window's failure rate at the moment of an append
#[derive(Debug, Clone)]
pub struct RateSample {
    pub family: String,
    pub total: usize,
    pub failures: usize,
    pub rate: f64,
    pub window: Duration,
}

/// Bounded, per-key sliding-window event log
///
/// Process-lifetime only; contents are lost on restart, which is fine because
/// the window is five minutes deep anyway.
pub struct WindowStore {
    windows: DashMap<String, VecDeque<(DateTime<Utc>, bool)>>,
    horizon: Duration,
    floor: usize,
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStore {
    pub fn new() -> Self {
        Self::with_horizon(Duration::seconds(METRIC_WINDOW_SECS), METRIC_RATE_FLOOR)
    }

    /// Construct with an explicit horizon and rate floor (used by tests)
    pub fn with_horizon(horizon: Duration, floor: usize) -> Self {
        Self {
            windows: DashMap::new(),
            horizon,
            floor,
        }
    }

    /// Metric family: the prefix before the first `.` separator
    ///
    /// `workflow.inspection_complete` -> `workflow`. Names without a
    /// separator are their own family.
    pub fn family(name: &str) -> &str {
        name.split('.').next().unwrap_or(name)
    }

    fn classify(name: &str, tags: &HashMap<String, String>) -> Outcome {
        if let Some(status) = tags.get("status") {
            match status.as_str() {
                "failure" | "error" => return Outcome::Failure,
                "success" => return Outcome::Success,
                _ => {}
            }
        }

        if name.contains("error") || name.contains("failure") {
            Outcome::Failure
        } else if name.contains("success") || name.contains("complete") {
            Outcome::Success
        } else {
            Outcome::Neutral
        }
    }

    /// Record a metric emission at the current time
    ///
    /// Returns a rate sample once the family's window holds at least the
    /// floor number of classified events; neutral metrics return `None`
    /// without touching any window.
    pub fn record(&self, name: &str, tags: &HashMap<String, String>) -> Option<RateSample> {
        self.record_at(name, tags, Utc::now())
    }

    /// Record with an explicit timestamp (injectable time for tests)
    pub fn record_at(
        &self,
        name: &str,
        tags: &HashMap<String, String>,
        at: DateTime<Utc>,
    ) -> Option<RateSample> {
        let outcome = Self::classify(name, tags);
        if outcome == Outcome::Neutral {
            return None;
        }

        let family = Self::family(name).to_string();
        let mut window = self.windows.entry(family.clone()).or_default();

        let cutoff = at - self.horizon;
        while window.front().is_some_and(|(ts, _)| *ts < cutoff) {
            window.pop_front();
        }
        while window.len() >= METRIC_WINDOW_MAX_EVENTS {
            window.pop_front();
        }

        window.push_back((at, outcome == Outcome::Failure));

        if window.len() < self.floor {
            return None;
        }

        let total = window.len();
        let failures = window.iter().filter(|(_, failed)| *failed).count();

        Some(RateSample {
            family,
            total,
            failures,
            rate: failures as f64 / total as f64,
            window: self.horizon,
        })
    }

    /// Current failure rate for a family, evicting stale events first
    ///
    /// `None` until the window holds at least the floor number of events.
    pub fn current_rate(&self, family: &str) -> Option<f64> {
        self.current_rate_at(family, Utc::now())
    }

    fn current_rate_at(&self, family: &str, now: DateTime<Utc>) -> Option<f64> {
        let mut window = self.windows.get_mut(family)?;

        let cutoff = now - self.horizon;
        while window.front().is_some_and(|(ts, _)| *ts < cutoff) {
            window.pop_front();
        }

        if window.len() < self.floor {
            return None;
        }

        let failures = window.iter().filter(|(_, failed)| *failed).count();
        Some(failures as f64 / window.len() as f64)
    }

    /// Number of metric families currently tracked
    pub fn family_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tags() -> HashMap<String, String> {
        HashMap::new()
    }

    fn failure_tags() -> HashMap<String, String> {
        HashMap::from([("status".to_string(), "failure".to_string())])
    }

    #[test]
    fn test_family_extraction() {
        assert_eq!(WindowStore::family("workflow.inspection_complete"), "workflow");
        assert_eq!(WindowStore::family("upload.failure"), "upload");
        assert_eq!(WindowStore::family("heartbeat"), "heartbeat");
    }

    #[test]
    fn test_classification_by_name_and_tag() {
        let store = WindowStore::with_horizon(Duration::seconds(300), 1);

        // Name-based
        assert!(store.record("workflow.inspection_error", &no_tags()).is_some());
        assert!(store.record("workflow.inspection_complete", &no_tags()).is_some());

        // Tag-based overrides a neutral name
        assert!(store.record("vision.health_check", &failure_tags()).is_some());

        // Neutral: not counted, no window created
        assert!(store.record("vision.latency", &no_tags()).is_none());
        assert!(store.current_rate("vision.latency").is_none());
    }

    #[test]
    fn test_rate_floor_and_nine_of_eleven() {
        let store = WindowStore::new();
        let now = Utc::now();

        // 9 failures then 2 successes; the floor of 10 is met at event 10
        for i in 0..9 {
            let sample = store.record_at("workflow.step_failure", &no_tags(), now);
            assert!(sample.is_none(), "no rate before floor (event {})", i + 1);
        }
        let tenth = store.record_at("workflow.step_complete", &no_tags(), now);
        assert!(tenth.is_some());

        let eleventh = store
            .record_at("workflow.step_complete", &no_tags(), now)
            .expect("rate after floor");
        assert_eq!(eleventh.total, 11);
        assert_eq!(eleventh.failures, 9);
        assert!((eleventh.rate - 9.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_events_evicted() {
        let store = WindowStore::with_horizon(Duration::seconds(300), 2);
        let old = Utc::now() - Duration::seconds(600);
        let now = Utc::now();

        for _ in 0..5 {
            store.record_at("upload.failure", &no_tags(), old);
        }
        store.record_at("upload.complete", &no_tags(), now);
        store.record_at("upload.complete", &no_tags(), now);

        // Old failures fell off: 0 failures out of 2 recent events
        let rate = store.current_rate("upload").expect("rate");
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_window_never_exceeds_cap() {
        let store = WindowStore::with_horizon(Duration::seconds(300), 1);
        let now = Utc::now();
        for _ in 0..(METRIC_WINDOW_MAX_EVENTS + 100) {
            store.record_at("flood.failure", &no_tags(), now);
        }
        let sample = store
            .record_at("flood.failure", &no_tags(), now)
            .expect("rate");
        assert!(sample.total <= METRIC_WINDOW_MAX_EVENTS);
    }

    #[test]
    fn test_families_are_independent() {
        let store = WindowStore::with_horizon(Duration::seconds(300), 1);
        store.record("workflow.failure", &no_tags());
        store.record("upload.complete", &no_tags());

        assert_eq!(store.current_rate("workflow"), Some(1.0));
        assert_eq!(store.current_rate("upload"), Some(0.0));
        assert_eq!(store.family_count(), 2);
    }
}
