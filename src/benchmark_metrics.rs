// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Operation timing collection and reporting

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Accumulated timings for one kind of operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub name: String,
    pub calls: u64,
    pub failures: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl OperationMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: 0,
            failures: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    /// Fold one call into the totals
    pub fn record(&mut self, duration: Duration, succeeded: bool) {
        self.calls += 1;
        if !succeeded {
            self.failures += 1;
        }
        self.total += duration;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }

    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }

    /// Mean call time in microseconds
    pub fn mean_us(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1_000_000.0 / self.calls as f64
    }

    pub fn min_us(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.min.as_secs_f64() * 1_000_000.0
    }

    pub fn max_us(&self) -> f64 {
        self.max.as_secs_f64() * 1_000_000.0
    }
}

/// Per-operation metrics keyed by operation name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkReport {
    title: String,
    metrics: BTreeMap<String, OperationMetrics>,
}

impl BenchmarkReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Record a single call of `operation`
    pub fn record(&mut self, operation: &str, duration: Duration, succeeded: bool) {
        self.metrics
            .entry(operation.to_string())
            .or_insert_with(|| OperationMetrics::new(operation))
            .record(duration, succeeded);
    }

    /// Time `f` and record it under `operation`; `f` reports success
    pub fn measure<R>(&mut self, operation: &str, f: impl FnOnce() -> (R, bool)) -> R {
        let timer = Timer::start();
        let (result, succeeded) = f();
        self.record(operation, timer.elapsed(), succeeded);
        result
    }

    pub fn get(&self, operation: &str) -> Option<&OperationMetrics> {
        self.metrics.get(operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationMetrics> {
        self.metrics.values()
    }

    pub fn total_calls(&self) -> u64 {
        self.metrics.values().map(|m| m.calls).sum()
    }

    /// Print formatted report to console
    pub fn print_report(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════════════╗");
        println!("║ {:<68} ║", self.title);
        println!("╠══════════════════════════════════════════════════════════════════════╣");
        println!(
            "║ {:<22} {:>8} {:>7} {:>9} {:>9} {:>9} ║",
            "operation", "calls", "failed", "mean µs", "min µs", "max µs"
        );
        println!("║ ──────────────────────────────────────────────────────────────────── ║");

        for metrics in self.metrics.values() {
            println!(
                "║ {:<22} {:>8} {:>7} {:>9.2} {:>9.2} {:>9.2} ║",
                metrics.name,
                metrics.calls,
                metrics.failures,
                metrics.mean_us(),
                metrics.min_us(),
                metrics.max_us()
            );
        }

        println!("╚══════════════════════════════════════════════════════════════════════╝\n");
    }

    /// Export report as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate() {
        let mut metrics = OperationMetrics::new("free");
        metrics.record(Duration::from_micros(10), true);
        metrics.record(Duration::from_micros(30), false);

        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.min, Duration::from_micros(10));
        assert_eq!(metrics.max, Duration::from_micros(30));
        assert!((metrics.mean_us() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_metrics_mean() {
        let metrics = OperationMetrics::new("idle");
        assert_eq!(metrics.mean_us(), 0.0);
        assert_eq!(metrics.min_us(), 0.0);
    }

    #[test]
    fn test_report_measure_and_json() {
        let mut report = BenchmarkReport::new("registry");
        let value = report.measure("create", || (42, true));
        report.record("create", Duration::from_micros(5), true);
        report.record("free", Duration::from_micros(1), false);

        assert_eq!(value, 42);
        assert_eq!(report.total_calls(), 3);
        assert_eq!(report.get("create").map(|m| m.calls), Some(2));

        let json = report.to_json().unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("free").map(|m| m.failures), Some(1));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }
}
