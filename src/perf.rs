//! Operation timing with slow-operation warnings
//!
//! Labelled start/end marks around pipeline stages (fetch, render,
//! aggregate). Durations land in a metrics map for reporting; anything
//! over the slow threshold is warned about through the logging layer so
//! regressions show up without a profiler attached.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Operations slower than this get a warning instead of a debug line.
const SLOW_THRESHOLD: Duration = Duration::from_millis(100);

/// Tracks labelled operation timings.
#[derive(Debug, Default)]
pub struct PerfMonitor {
    marks: HashMap<String, Instant>,
    metrics: HashMap<String, Duration>,
}

impl PerfMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `label`. Restarting an open mark resets it.
    pub fn start(&mut self, label: &str) {
        self.marks.insert(label.to_string(), Instant::now());
    }

    /// Finish timing `label`, record and return the duration.
    ///
    /// An `end` without a matching `start` logs a warning and returns None.
    pub fn end(&mut self, label: &str) -> Option<Duration> {
        let Some(started) = self.marks.remove(label) else {
            warn!("no start mark found for: {}", label);
            return None;
        };

        let duration = started.elapsed();
        if duration > SLOW_THRESHOLD {
            warn!("slow operation: {} took {:.2}ms", label, as_ms(duration));
        } else {
            debug!("{}: {:.2}ms", label, as_ms(duration));
        }

        self.metrics.insert(label.to_string(), duration);
        Some(duration)
    }

    /// Time a closure under `label`.
    pub fn measure<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        self.start(label);
        let result = f();
        self.end(label);
        result
    }

    /// All recorded durations.
    pub fn metrics(&self) -> &HashMap<String, Duration> {
        &self.metrics
    }

    /// Human-readable summary, one sorted line per label.
    pub fn report(&self) -> String {
        let mut labels: Vec<&String> = self.metrics.keys().collect();
        labels.sort();
        labels
            .iter()
            .map(|label| format!("{}: {:.2}ms", label, as_ms(self.metrics[*label])))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn as_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_records_a_metric() {
        let mut perf = PerfMonitor::new();
        let value = perf.measure("sum", || 1 + 1);
        assert_eq!(value, 2);
        assert!(perf.metrics().contains_key("sum"));
    }

    #[test]
    fn end_without_start_returns_none() {
        let mut perf = PerfMonitor::new();
        assert!(perf.end("never-started").is_none());
    }

    #[test]
    fn end_consumes_the_mark() {
        let mut perf = PerfMonitor::new();
        perf.start("once");
        assert!(perf.end("once").is_some());
        assert!(perf.end("once").is_none());
    }

    #[test]
    fn report_lists_labels_sorted() {
        let mut perf = PerfMonitor::new();
        perf.measure("b-render", || ());
        perf.measure("a-fetch", || ());

        let report = perf.report();
        let a = report.find("a-fetch").unwrap();
        let b = report.find("b-render").unwrap();
        assert!(a < b);
    }
}
