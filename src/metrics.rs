use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::Status;
use crate::workload::Operation;

#[derive(Default, Clone)]
struct OperationSamples {
    latencies: Vec<Duration>,
    errors: u64,
}

#[derive(Default, Clone)]
pub struct Metrics {
    operations: BTreeMap<Operation, OperationSamples>,
}

#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn record(&self, operation: Operation, duration: Duration, status: Status) {
        self.metrics.lock().await.record(operation, duration, status);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

/// Latency statistics of one operation kind, in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub operation: Operation,
    pub count: u64,
    pub errors: u64,
    pub min_ns: f64,
    pub max_ns: f64,
    pub mean_ns: f64,
    pub p50_ns: f64,
    pub p95_ns: f64,
    pub p99_ns: f64,
    pub throughput_ops: f64,
}

impl Metrics {
    pub fn record(&mut self, operation: Operation, duration: Duration, status: Status) {
        let samples = self.operations.entry(operation).or_default();
        samples.latencies.push(duration);
        if status != Status::Ok {
            samples.errors += 1;
        }
    }

    pub fn total_operations(&self) -> u64 {
        self.operations
            .values()
            .map(|s| s.latencies.len() as u64)
            .sum()
    }

    pub fn summary(&self) -> Vec<OperationSummary> {
        self.operations
            .iter()
            .filter_map(|(operation, samples)| Self::calculate_stats(*operation, samples))
            .collect()
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1_000.0 {
            format!("{:.2} ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.2} µs", nanos / 1_000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.2} ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos / 1_000_000_000.0)
        }
    }

    fn calculate_stats(
        operation: Operation,
        samples: &OperationSamples,
    ) -> Option<OperationSummary> {
        let latencies = &samples.latencies;
        if latencies.is_empty() {
            return None;
        }

        let count = latencies.len() as u64;

        // Streaming mean avoids overflow on long runs
        let mut mean = 0.0;
        for (i, d) in latencies.iter().enumerate() {
            mean += (d.as_nanos() as f64 - mean) / (i + 1) as f64;
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();

        let at = |pct: u64| sorted[((count - 1) * pct / 100) as usize].as_nanos() as f64;
        let busy = sorted.iter().sum::<Duration>().as_secs_f64();
        let throughput_ops = if busy > 0.0 { count as f64 / busy } else { 0.0 };

        Some(OperationSummary {
            operation,
            count,
            errors: samples.errors,
            min_ns: sorted[0].as_nanos() as f64,
            max_ns: sorted[sorted.len() - 1].as_nanos() as f64,
            mean_ns: mean,
            p50_ns: at(50),
            p95_ns: at(95),
            p99_ns: at(99),
            throughput_ops,
        })
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nDetailed Latency Statistics:")?;
        writeln!(
            f,
            "{:<15} {:<10} {:<8} {:<12} {:<12} {:<12} {:<12} {:<12} {:<14}",
            "Operation", "Count", "Errors", "Min", "Max", "Median", "P95", "P99", "Ops/sec"
        )?;
        writeln!(f, "{:-<113}", "")?;

        for stats in self.summary() {
            writeln!(
                f,
                "{:<15} {:<10} {:<8} {:<12} {:<12} {:<12} {:<12} {:<12} {:<14.2}",
                stats.operation.label(),
                stats.count,
                stats.errors,
                Self::format_duration(stats.min_ns),
                Self::format_duration(stats.max_ns),
                Self::format_duration(stats.p50_ns),
                Self::format_duration(stats.p95_ns),
                Self::format_duration(stats.p99_ns),
                stats.throughput_ops,
            )?;
        }

        Ok(())
    }
}
