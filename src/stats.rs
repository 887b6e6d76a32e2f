use crate::config::BenchConfig;
use crate::driver::TestResult;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("result stream closed after {received} of {expected} results")]
    StreamClosed { expected: usize, received: usize },
}

// =============================================================================
// Latency Stats
// =============================================================================

/// Running min/max/sum over latencies in seconds, plus how many crossed the
/// time limit. Empty stats report `inf`/`-inf` bounds and a NaN mean.
#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub total: f64,
    pub timeouts: usize,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            total: 0.0,
            timeouts: 0,
        }
    }
}

impl LatencyStats {
    fn record(&mut self, seconds: f64, timed_out: bool) {
        self.count += 1;
        self.total += seconds;
        self.min = self.min.min(seconds);
        self.max = self.max.max(seconds);
        if timed_out {
            self.timeouts += 1;
        }
    }

    pub fn mean(&self) -> f64 {
        self.total / self.count as f64
    }
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub req_count: usize,
    /// Requests that ended in a transport error.
    pub failed: usize,
    /// Requests that succeeded at the transport level but returned no items.
    pub empty: usize,
    pub all: LatencyStats,
    /// Requests that returned at least one item.
    pub success: LatencyStats,
}

impl Summary {
    fn new(req_count: usize) -> Self {
        Self {
            req_count,
            failed: 0,
            empty: 0,
            all: LatencyStats::default(),
            success: LatencyStats::default(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.success.count
    }

    pub fn timeout_ratio(&self) -> f64 {
        percent(self.all.timeouts, self.req_count)
    }

    pub fn success_ratio(&self) -> f64 {
        percent(self.success.count, self.req_count)
    }

    /// Share of successful requests that crossed the time limit.
    pub fn success_timeout_ratio(&self) -> f64 {
        percent(self.success.timeouts, self.success.count)
    }

    pub fn print(&self) {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                    BENCHMARK SUMMARY                       ║");
        info!("╚════════════════════════════════════════════════════════════╝");

        info!("");
        info!("Requests:");
        info!("  Total:         {}", self.req_count);
        info!("  Success:       {} ({:.2}%)", self.success_count(), self.success_ratio());
        info!("  Failed:        {}", self.failed);
        info!("  Empty:         {}", self.empty);
        info!("  Timed Out:     {} ({:.2}%)", self.all.timeouts, self.timeout_ratio());

        info!("");
        info!("Latency, all requests (s):");
        log_latency(&self.all);

        info!("");
        info!("Latency, successful requests (s):");
        log_latency(&self.success);
        info!(
            "  Timed Out:     {} ({:.2}%)",
            self.success.timeouts,
            self.success_timeout_ratio()
        );

        info!("");
        info!("═══════════════════════════════════════════════════════════");
    }
}

fn log_latency(stats: &LatencyStats) {
    if stats.count > 0 {
        info!("  Min:    {:.5}", stats.min);
        info!("  Mean:   {:.5}", stats.mean());
        info!("  Max:    {:.5}", stats.max);
    } else {
        info!("  No data");
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    part as f64 / whole as f64 * 100.0
}

// =============================================================================
// Aggregator
// =============================================================================

/// Single-pass fold over the results of one run.
pub struct Aggregator {
    config: Arc<BenchConfig>,
    summary: Summary,
}

impl Aggregator {
    pub fn new(config: Arc<BenchConfig>, req_count: usize) -> Self {
        Self {
            config,
            summary: Summary::new(req_count),
        }
    }

    pub fn observe(&mut self, result: &TestResult) {
        let seconds = result.cost.as_secs_f64();
        let timed_out = self.config.is_timeout(result.cost);

        self.summary.all.record(seconds, timed_out);

        if result.count > 0 {
            self.summary.success.record(seconds, timed_out);
        } else if result.error.is_some() {
            self.summary.failed += 1;
        } else {
            self.summary.empty += 1;
        }
    }

    /// Receives exactly `req_count` results and folds them. Fails if the
    /// channel closes early.
    pub async fn collect(
        mut self,
        results: &mut mpsc::Receiver<TestResult>,
    ) -> Result<Summary, StatsError> {
        let expected = self.summary.req_count;
        for received in 0..expected {
            match results.recv().await {
                Some(result) => self.observe(&result),
                None => return Err(StatsError::StreamClosed { expected, received }),
            }
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> Summary {
        self.summary
    }
}
