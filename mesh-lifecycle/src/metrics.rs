use std::collections::HashMap;
use std::time::Duration;

use mesh_primitives::now_unix;
use parking_lot::RwLock;
use serde::Serialize;

/// Per-service bound on rolling timer history. Retention was
/// source-configurable but inconsistently applied; this crate fixes the
/// bound at 100 samples per timer (spec.md §9 design note).
const TIMER_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimerSnapshot {
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

struct Timer {
    samples: Vec<Duration>,
    last_update: i64,
}

impl Timer {
    fn new() -> Self {
        Self { samples: Vec::with_capacity(TIMER_CAPACITY), last_update: now_unix() }
    }

    fn record(&mut self, duration: Duration) {
        if self.samples.len() == TIMER_CAPACITY {
            self.samples.remove(0);
        }
        self.samples.push(duration);
        self.last_update = now_unix();
    }

    fn snapshot(&self) -> TimerSnapshot {
        if self.samples.is_empty() {
            return TimerSnapshot::default();
        }
        let mut millis: Vec<f64> = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        millis.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p = |q: f64| -> f64 {
            let idx = ((millis.len() as f64 - 1.0) * q).round() as usize;
            millis[idx.min(millis.len() - 1)]
        };
        TimerSnapshot {
            count: millis.len(),
            p50_ms: p(0.50),
            p95_ms: p(0.95),
            max_ms: *millis.last().unwrap(),
        }
    }
}

/// A service's metrics bag: increment-only counters, last-write-wins
/// gauges, and bounded rolling timers with p50/p95/max aggregation
/// (spec.md §4.5 "Metrics"). All reads take a snapshot so they never
/// block a concurrent write.
#[derive(Default)]
pub struct MetricsBag {
    counters: RwLock<HashMap<String, u64>>,
    gauges: RwLock<HashMap<String, f64>>,
    timers: RwLock<HashMap<String, Timer>>,
}

impl MetricsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &str, by: u64) {
        *self.counters.write().entry(name.to_string()).or_insert(0) += by;
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.write().insert(name.to_string(), value);
    }

    pub fn record_timer(&self, name: &str, duration: Duration) {
        self.timers.write().entry(name.to_string()).or_insert_with(Timer::new).record(duration);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.read().clone(),
            gauges: self.gauges.read().clone(),
            timers: self.timers.read().iter().map(|(k, v)| (k.clone(), v.snapshot())).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub timers: HashMap<String, TimerSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_only_increase() {
        let bag = MetricsBag::new();
        bag.incr("calls", 1);
        bag.incr("calls", 2);
        assert_eq!(bag.snapshot().counters["calls"], 3);
    }

    #[test]
    fn gauges_are_last_write_wins() {
        let bag = MetricsBag::new();
        bag.set_gauge("queue_depth", 5.0);
        bag.set_gauge("queue_depth", 2.0);
        assert_eq!(bag.snapshot().gauges["queue_depth"], 2.0);
    }

    #[test]
    fn timer_history_is_bounded() {
        let bag = MetricsBag::new();
        for i in 0..150 {
            bag.record_timer("op", Duration::from_millis(i));
        }
        let snapshot = bag.snapshot();
        assert_eq!(snapshot.timers["op"].count, TIMER_CAPACITY);
    }
}
