//! Per-worker results merged into the final `RunResult`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

use crate::config::RunOptions;
use crate::histogram::{Histogram, HistogramData};

/// What one worker produces; cheap to move across a channel/join.
pub struct WorkerResult {
    pub histogram: Histogram,
    pub connect_histogram: Histogram,
    pub codes: HashMap<i64, u64>,
    pub socket_count: u64,
    pub ip_usage: HashMap<IpAddr, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub histogram: HistogramData,
    pub connect_histogram: HistogramData,
    pub retcodes: HashMap<i64, u64>,
    pub actual_qps: f64,
    pub actual_duration: Duration,
    pub socket_count: u64,
    pub ip_usage: HashMap<String, u64>,
    pub per_thread_socket_counts: Vec<u64>,
    pub aborted: bool,
    /// Set when the run never reached the timed phase (warmup or URL
    /// setup failed and `--allow-initial-errors` was not set).
    pub init_error: bool,
    pub options: RunOptions,
}

/// Merges per-worker results serially once every worker has exited.
pub struct Aggregator {
    histogram: Histogram,
    connect_histogram: Histogram,
    codes: HashMap<i64, u64>,
    socket_count: u64,
    per_thread_socket_counts: Vec<u64>,
    ip_usage: HashMap<IpAddr, u64>,
}

impl Aggregator {
    pub fn new(template: &Histogram, connect_template: &Histogram) -> Self {
        Self {
            histogram: template.clone_empty(),
            connect_histogram: connect_template.clone_empty(),
            codes: HashMap::new(),
            socket_count: 0,
            per_thread_socket_counts: Vec::new(),
            ip_usage: HashMap::new(),
        }
    }

    pub fn absorb(&mut self, mut worker: WorkerResult) {
        self.histogram.transfer(&mut worker.histogram);
        self.connect_histogram.transfer(&mut worker.connect_histogram);
        for (code, count) in worker.codes {
            *self.codes.entry(code).or_insert(0) += count;
        }
        self.socket_count += worker.socket_count;
        self.per_thread_socket_counts.push(worker.socket_count);
        for (ip, count) in worker.ip_usage {
            *self.ip_usage.entry(ip).or_insert(0) += count;
        }
    }

    pub fn finish(self, options: RunOptions, actual_duration: Duration, aborted: bool) -> RunResult {
        let actual_qps = if actual_duration.as_secs_f64() > 0.0 {
            self.histogram.count() as f64 / actual_duration.as_secs_f64()
        } else {
            0.0
        };
        RunResult {
            histogram: self.histogram.export(&options.percentiles),
            connect_histogram: self.connect_histogram.export(&options.percentiles),
            retcodes: self.codes,
            actual_qps,
            actual_duration,
            socket_count: self.socket_count,
            ip_usage: self
                .ip_usage
                .into_iter()
                .map(|(ip, count)| (ip.to_string(), count))
                .collect(),
            per_thread_socket_counts: self.per_thread_socket_counts,
            aborted,
            init_error: false,
            options,
        }
    }

    /// Degenerate result for a run that never got past warmup, per
    /// a two-point histogram so
    /// downstream visualizations still have something to render.
    pub fn error_result(options: RunOptions, message: &str) -> RunResult {
        let mut h = Histogram::new(options.offset, options.resolution);
        h.record(0.0);
        h.record(0.0);
        tracing::error!(%message, "run aborted before timed phase began");
        RunResult {
            histogram: h.export(&options.percentiles),
            connect_histogram: Histogram::new(options.offset, options.resolution).export(&options.percentiles),
            retcodes: HashMap::new(),
            actual_qps: 0.0,
            actual_duration: Duration::ZERO,
            socket_count: 0,
            ip_usage: HashMap::new(),
            per_thread_socket_counts: Vec::new(),
            aborted: true,
            init_error: true,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunDuration;

    fn run_options() -> RunOptions {
        RunOptions {
            qps: 50.0,
            num_threads: 2,
            duration: RunDuration::Finite(Duration::from_secs(1)),
            exactly: None,
            resolution: 0.0001,
            offset: 0.0,
            percentiles: vec![50.0, 99.0],
            uniform: false,
            jitter: false,
            no_catch_up: false,
            sequential_warmup: false,
            allow_initial_errors: false,
            abort_on: None,
        }
    }

    #[test]
    fn merged_histogram_count_equals_sum_of_per_thread_counts() {
        let template = Histogram::new(0.0, 0.0001);
        let mut agg = Aggregator::new(&template, &template);

        for n in [10u64, 15, 7] {
            let mut h = template.clone_empty();
            for i in 0..n {
                h.record(i as f64 * 0.001);
            }
            let mut codes = HashMap::new();
            codes.insert(200, n);
            agg.absorb(WorkerResult {
                histogram: h,
                connect_histogram: template.clone_empty(),
                codes,
                socket_count: 1,
                ip_usage: HashMap::new(),
            });
        }

        let result = agg.finish(run_options(), Duration::from_secs(1), false);
        let total_codes: u64 = result.retcodes.values().sum();
        assert_eq!(result.histogram.count, 32);
        assert_eq!(total_codes, 32);
    }

    #[test]
    fn code_maps_add_on_key_collision() {
        let template = Histogram::new(0.0, 0.0001);
        let mut agg = Aggregator::new(&template, &template);
        for _ in 0..3 {
            let mut codes = HashMap::new();
            codes.insert(200, 5u64);
            codes.insert(404, 1u64);
            agg.absorb(WorkerResult {
                histogram: template.clone_empty(),
                connect_histogram: template.clone_empty(),
                codes,
                socket_count: 0,
                ip_usage: HashMap::new(),
            });
        }
        let result = agg.finish(run_options(), Duration::from_secs(1), false);
        assert_eq!(result.retcodes[&200], 15);
        assert_eq!(result.retcodes[&404], 3);
    }
}
