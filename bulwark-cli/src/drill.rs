//! Synthetic load against a guarded call site
//!
//! A drill spreads a fixed number of calls over a pool of worker tasks. Every
//! call resolves the chain for the call site from the [`GuardListSource`], runs
//! under a principal derived from its sequence number, and is recorded in
//! [`DrillMetrics`] once the chain returns.

use crate::config::{DrillConfig, OutputFormat};
use crate::metrics::{DrillCounts, DrillMetrics, Outcome};
use anyhow::{Result, anyhow};
use bulwark::{GuardListSource, GuardSnapshot, GuardState, Principal, with_principal};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;

/// Failure injected into every `fail_every`-th action
#[derive(Debug, Error, PartialEq, Eq)]
#[error("synthetic failure on request {request}")]
pub struct DrillFailure {
    pub request: u64,
}

/// Result of a drill
#[derive(Debug, Clone, Serialize)]
pub struct DrillReport {
    pub call_site: String,
    /// Guard names in chain order, as resolved when the drill started
    pub chain: Vec<String>,
    pub workers: usize,
    pub elapsed_ms: u64,
    pub mean_latency_us: u64,
    pub counts: DrillCounts,
    /// State of the guards after the last call returned
    pub guards: Vec<GuardSnapshot>,
    #[serde(skip)]
    prometheus: String,
}

/// Principal for the `n`-th call
///
/// Calls are spread round-robin over `user-0 .. user-{principals - 1}`; with no
/// principals every call is anonymous.
pub fn principal_for(n: u64, principals: u64) -> Principal {
    if principals == 0 {
        Principal::Anonymous
    } else {
        Principal::authenticated(format!("user-{}", n % principals))
    }
}

/// Drive `config.requests` calls through the chain bound to `config.call_site`
///
/// `snapshots` is consulted once all workers have finished, so the report
/// shows the guards' state at the end of the drill.
///
/// # Errors
///
/// Returns an error if a worker task panics.
pub async fn run<S>(
    source: Arc<S>,
    config: &DrillConfig,
    snapshots: impl FnOnce() -> Vec<GuardSnapshot>,
) -> Result<DrillReport>
where
    S: GuardListSource + 'static,
{
    let metrics = Arc::new(DrillMetrics::new());
    let next_request = Arc::new(AtomicU64::new(0));
    let chain: Vec<String> = source
        .guards(&config.call_site)
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();

    tracing::info!(
        call_site = %config.call_site,
        chain = ?chain,
        requests = config.requests,
        workers = config.workers,
        "Starting drill"
    );

    let mut workers = JoinSet::new();
    for worker in 0..config.workers {
        let source = Arc::clone(&source);
        let metrics = Arc::clone(&metrics);
        let next_request = Arc::clone(&next_request);
        let config = config.clone();

        workers.spawn(async move {
            loop {
                let n = next_request.fetch_add(1, Ordering::Relaxed);
                if n >= config.requests {
                    break;
                }

                let chain = source.guards(&config.call_site);
                let hold = config.hold;
                let fail = config.fail_every > 0 && (n + 1) % config.fail_every == 0;

                let started = Instant::now();
                let result = with_principal(
                    principal_for(n, config.principals),
                    chain.execute(|| async move {
                        if !hold.is_zero() {
                            tokio::time::sleep(hold).await;
                        }
                        if fail {
                            Err(DrillFailure { request: n })
                        } else {
                            Ok(n)
                        }
                    }),
                )
                .await;
                let outcome = Outcome::of(&result);
                metrics.record(outcome, started.elapsed().as_micros() as u64);

                if let Err(e) = result {
                    tracing::trace!(worker, request = n, ?outcome, error = %e, "Call did not succeed");
                }
            }
        });
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            tracing::error!("Drill worker panicked: {}", e);
            return Err(anyhow!("Drill worker panicked"));
        }
    }

    let counts = metrics.counts();
    tracing::info!(
        total = counts.total,
        succeeded = counts.succeeded,
        rejected = counts.rejected(),
        "Drill finished"
    );

    Ok(DrillReport {
        call_site: config.call_site.clone(),
        chain,
        workers: config.workers,
        elapsed_ms: metrics.elapsed_millis(),
        mean_latency_us: metrics.mean_latency_micros(),
        counts,
        guards: snapshots(),
        prometheus: metrics.export_prometheus(),
    })
}

impl DrillReport {
    /// Render the report in `format`
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Prometheus => Ok(self.render_prometheus()),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        let counts = &self.counts;

        let _ = writeln!(
            out,
            "Drill of '{}' through [{}]",
            self.call_site,
            self.chain.join(", ")
        );
        let _ = writeln!(
            out,
            "  {} calls from {} workers in {} ms (mean latency {} us)",
            counts.total, self.workers, self.elapsed_ms, self.mean_latency_us
        );
        let _ = writeln!(out);
        for (label, value) in [
            ("succeeded", counts.succeeded),
            ("failed", counts.failed),
            ("rejected (concurrency)", counts.rejected_concurrency),
            ("rejected (rate)", counts.rejected_rate),
            ("unauthenticated", counts.unauthenticated),
            ("guard errors", counts.guard_errors),
        ] {
            let _ = writeln!(out, "  {label:<24}{value:>10}");
        }

        if !self.guards.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Guards:");
            for guard in &self.guards {
                let state = match guard.state {
                    GuardState::Concurrency {
                        in_flight,
                        available,
                    } => format!("in_flight={in_flight} available={available}"),
                    GuardState::RateLimiting {
                        window,
                        tracked_identities,
                    } => format!("window={window} tracked_identities={tracked_identities}"),
                };
                let _ = writeln!(
                    out,
                    "  {} ({}, limit {}): {}",
                    guard.name, guard.kind, guard.limit, state
                );
            }
        }

        out
    }

    fn render_prometheus(&self) -> String {
        let mut out = self.prometheus.clone();

        out.push_str("\n# HELP bulwark_guard_limit Configured limit of each guard\n");
        out.push_str("# TYPE bulwark_guard_limit gauge\n");
        for guard in &self.guards {
            let _ = writeln!(
                out,
                "bulwark_guard_limit{{guard=\"{}\",kind=\"{}\"}} {}",
                guard.name, guard.kind, guard.limit
            );
        }

        out.push_str("\n# HELP bulwark_guard_in_flight Actions holding a concurrency permit\n");
        out.push_str("# TYPE bulwark_guard_in_flight gauge\n");
        for guard in &self.guards {
            if let GuardState::Concurrency { in_flight, .. } = guard.state {
                let _ = writeln!(
                    out,
                    "bulwark_guard_in_flight{{guard=\"{}\"}} {in_flight}",
                    guard.name
                );
            }
        }

        out.push_str(
            "\n# HELP bulwark_guard_tracked_identities Identities counted in the current window\n",
        );
        out.push_str("# TYPE bulwark_guard_tracked_identities gauge\n");
        for guard in &self.guards {
            if let GuardState::RateLimiting {
                tracked_identities, ..
            } = guard.state
            {
                let _ = writeln!(
                    out,
                    "bulwark_guard_tracked_identities{{guard=\"{}\"}} {tracked_identities}",
                    guard.name
                );
            }
        }

        out
    }
}
