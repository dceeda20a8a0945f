//! Outcome counters for drills
//!
//! Workers record every call into lock-free atomic counters, so recording adds
//! no contention of its own to the guards being exercised.

use bulwark::{ExecuteError, GuardError};
use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// How a single drill call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action ran and succeeded
    Succeeded,
    /// The action ran and returned its own error
    Failed,
    /// An admission-control guard had no free permit
    ConcurrencyRejected,
    /// The caller used up its allowance for the window
    RateRejected,
    /// A rate-limiting guard found no authenticated caller
    Unauthenticated,
    /// A guard misbehaved or was misconfigured
    GuardError,
}

impl Outcome {
    /// Classify the result of a guarded call
    pub fn of<T, E>(result: &Result<T, ExecuteError<E>>) -> Self {
        match result {
            Ok(_) => Outcome::Succeeded,
            Err(ExecuteError::Action(_)) => Outcome::Failed,
            Err(ExecuteError::Rejected(rejection)) => match rejection {
                GuardError::ConcurrencyLimitExceeded { .. } => Outcome::ConcurrencyRejected,
                GuardError::RateLimitExceeded { .. } => Outcome::RateRejected,
                GuardError::Unauthenticated => Outcome::Unauthenticated,
                GuardError::InvalidConfiguration(_) | GuardError::ActionNotInvoked => {
                    Outcome::GuardError
                }
            },
        }
    }
}

/// Counters collected while a drill runs
pub struct DrillMetrics {
    start_time: Instant,

    pub total_requests: AtomicU64,

    /// Calls whose action ran
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,

    /// Calls turned away by a guard
    pub rejected_concurrency: AtomicU64,
    pub rejected_rate: AtomicU64,
    pub unauthenticated: AtomicU64,

    /// Calls lost to a misbehaving or misconfigured guard
    pub guard_errors: AtomicU64,

    /// Call latency buckets, including rejected calls
    pub latency_under_1ms: AtomicU64,
    pub latency_under_10ms: AtomicU64,
    pub latency_under_100ms: AtomicU64,
    pub latency_under_1s: AtomicU64,
    pub latency_over_1s: AtomicU64,

    pub latency_sum_micros: AtomicU64,
}

/// Point-in-time copy of [`DrillMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrillCounts {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected_concurrency: u64,
    pub rejected_rate: u64,
    pub unauthenticated: u64,
    pub guard_errors: u64,
}

impl DrillCounts {
    /// Calls turned away by a guard's admission decision
    ///
    /// Guard errors are not rejections and are counted separately.
    pub fn rejected(&self) -> u64 {
        self.rejected_concurrency + self.rejected_rate + self.unauthenticated
    }
}

impl DrillMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected_concurrency: AtomicU64::new(0),
            rejected_rate: AtomicU64::new(0),
            unauthenticated: AtomicU64::new(0),
            guard_errors: AtomicU64::new(0),
            latency_under_1ms: AtomicU64::new(0),
            latency_under_10ms: AtomicU64::new(0),
            latency_under_100ms: AtomicU64::new(0),
            latency_under_1s: AtomicU64::new(0),
            latency_over_1s: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
        }
    }

    /// Record one call and how long it took
    pub fn record(&self, outcome: Outcome, latency_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let counter = match outcome {
            Outcome::Succeeded => &self.succeeded,
            Outcome::Failed => &self.failed,
            Outcome::ConcurrencyRejected => &self.rejected_concurrency,
            Outcome::RateRejected => &self.rejected_rate,
            Outcome::Unauthenticated => &self.unauthenticated,
            Outcome::GuardError => &self.guard_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        match latency_us {
            0..=999 => self.latency_under_1ms.fetch_add(1, Ordering::Relaxed),
            1000..=9999 => self.latency_under_10ms.fetch_add(1, Ordering::Relaxed),
            10000..=99999 => self.latency_under_100ms.fetch_add(1, Ordering::Relaxed),
            100000..=999999 => self.latency_under_1s.fetch_add(1, Ordering::Relaxed),
            _ => self.latency_over_1s.fetch_add(1, Ordering::Relaxed),
        };
        self.latency_sum_micros
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn counts(&self) -> DrillCounts {
        DrillCounts {
            total: self.total_requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected_concurrency: self.rejected_concurrency.load(Ordering::Relaxed),
            rejected_rate: self.rejected_rate.load(Ordering::Relaxed),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            guard_errors: self.guard_errors.load(Ordering::Relaxed),
        }
    }

    /// Mean latency in microseconds, 0 before the first call
    pub fn mean_latency_micros(&self) -> u64 {
        let count = self.total_requests.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.latency_sum_micros.load(Ordering::Relaxed) / count
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let counts = self.counts();
        let mut output = String::with_capacity(1500);

        output.push_str("# HELP bulwark_drill_requests_total Total calls made by the drill\n");
        output.push_str("# TYPE bulwark_drill_requests_total counter\n");
        let _ = writeln!(output, "bulwark_drill_requests_total {}\n", counts.total);

        output.push_str("# HELP bulwark_drill_actions_total Calls whose action ran, by result\n");
        output.push_str("# TYPE bulwark_drill_actions_total counter\n");
        let _ = writeln!(
            output,
            "bulwark_drill_actions_total{{result=\"succeeded\"}} {}",
            counts.succeeded
        );
        let _ = writeln!(
            output,
            "bulwark_drill_actions_total{{result=\"failed\"}} {}\n",
            counts.failed
        );

        output.push_str("# HELP bulwark_drill_rejections_total Calls turned away, by reason\n");
        output.push_str("# TYPE bulwark_drill_rejections_total counter\n");
        for (reason, value) in [
            ("concurrency", counts.rejected_concurrency),
            ("rate", counts.rejected_rate),
            ("unauthenticated", counts.unauthenticated),
        ] {
            let _ = writeln!(
                output,
                "bulwark_drill_rejections_total{{reason=\"{reason}\"}} {value}"
            );
        }
        output.push('\n');

        output.push_str(
            "# HELP bulwark_drill_guard_errors_total Calls lost to a misbehaving or misconfigured guard\n",
        );
        output.push_str("# TYPE bulwark_drill_guard_errors_total counter\n");
        let _ = writeln!(
            output,
            "bulwark_drill_guard_errors_total {}\n",
            counts.guard_errors
        );

        // Buckets are cumulative
        let buckets = [
            ("0.001", &self.latency_under_1ms),
            ("0.01", &self.latency_under_10ms),
            ("0.1", &self.latency_under_100ms),
            ("1", &self.latency_under_1s),
        ];
        output.push_str("# HELP bulwark_drill_call_duration_seconds Call latency distribution\n");
        output.push_str("# TYPE bulwark_drill_call_duration_seconds histogram\n");
        let mut cumulative = 0;
        for (le, bucket) in buckets {
            cumulative += bucket.load(Ordering::Relaxed);
            let _ = writeln!(
                output,
                "bulwark_drill_call_duration_seconds_bucket{{le=\"{le}\"}} {cumulative}"
            );
        }
        let _ = writeln!(
            output,
            "bulwark_drill_call_duration_seconds_bucket{{le=\"+Inf\"}} {}",
            counts.total
        );
        let latency_sum_seconds =
            self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(
            output,
            "bulwark_drill_call_duration_seconds_sum {latency_sum_seconds:.6}"
        );
        let _ = writeln!(
            output,
            "bulwark_drill_call_duration_seconds_count {}",
            counts.total
        );

        output
    }
}

impl Default for DrillMetrics {
    fn default() -> Self {
        Self::new()
    }
}
