use crate::config::BenchConfig;
use crate::search::{ConditionGenerator, SearchRequest};
use crate::transport::{SearchClient, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// =============================================================================
// Results
// =============================================================================

/// Outcome of one dispatched request.
#[derive(Debug)]
pub struct TestResult {
    pub error: Option<TransportError>,
    pub cost: Duration,
    pub count: usize,
}

impl TestResult {
    pub fn success(cost: Duration, count: usize) -> Self {
        Self {
            error: None,
            cost,
            count,
        }
    }

    pub fn failure(error: TransportError, cost: Duration) -> Self {
        Self {
            error: Some(error),
            cost,
            count: 0,
        }
    }
}

/// Receiving ends of the two buffers the tasks write into. Both are sized to
/// the full request count of the run.
pub struct Collector {
    pub results: mpsc::Receiver<TestResult>,
    pub timed_out: mpsc::Receiver<SearchRequest>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub elapsed: Duration,
}

/// Produces the payload for each task.
pub trait RequestSource: Send + Sync + 'static {
    fn next_request(&self) -> SearchRequest;
}

impl RequestSource for ConditionGenerator {
    fn next_request(&self) -> SearchRequest {
        self.build_request()
    }
}

// =============================================================================
// Driver
// =============================================================================

pub struct Driver<C, S> {
    config: Arc<BenchConfig>,
    client: Arc<C>,
    source: Arc<S>,
    results: mpsc::Sender<TestResult>,
    timed_out: mpsc::Sender<SearchRequest>,
}

impl<C, S> Driver<C, S>
where
    C: SearchClient,
    S: RequestSource,
{
    pub fn new(config: Arc<BenchConfig>, client: Arc<C>, source: Arc<S>) -> (Self, Collector) {
        let capacity = config.req_count();
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (timed_out_tx, timed_out_rx) = mpsc::channel(capacity);

        let driver = Self {
            config,
            client,
            source,
            results: results_tx,
            timed_out: timed_out_tx,
        };
        let collector = Collector {
            results: results_rx,
            timed_out: timed_out_rx,
        };
        (driver, collector)
    }

    /// Spawns `qps` tasks at the start of every second until the benchmark
    /// duration elapses, then returns without waiting for them.
    ///
    /// Tasks are never cancelled. A service slower than one second per
    /// request accumulates in-flight tasks without bound, and those keep
    /// running (and reporting) after this returns. The result channel closes
    /// once the last of them finishes.
    pub async fn run(self) -> DispatchReport {
        let started = Instant::now();
        let seconds = self.config.seconds();

        let deadline = sleep(self.config.duration);
        tokio::pin!(deadline);

        let mut ticker = second_ticker();
        ticker.tick().await;

        let mut dispatched = 0;
        let mut second = 0;

        loop {
            for _ in 0..self.config.qps {
                self.spawn_task();
                dispatched += 1;
            }
            second += 1;

            // The deadline wins ties so the last tick never dispatches an
            // extra batch.
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    info!("Dispatch complete: {} requests over {}s", dispatched, seconds);
                    break;
                }

                _ = ticker.tick() => {
                    info!("Second {}/{}: dispatched={}", second, seconds, dispatched);
                }
            }
        }

        DispatchReport {
            dispatched,
            elapsed: started.elapsed(),
        }
    }

    fn spawn_task(&self) {
        let config = Arc::clone(&self.config);
        let client = Arc::clone(&self.client);
        let source = Arc::clone(&self.source);
        let results = self.results.clone();
        let timed_out = self.timed_out.clone();

        tokio::spawn(async move {
            run_task(config, client, source, results, timed_out).await;
        });
    }
}

/// One tick per second. A stalled tick pushes the schedule back instead of
/// firing the missed batches back to back, so at most one batch is dispatched
/// per tick. Dispatch may then fall short of `qps * seconds`; the run reports
/// the actual count.
fn second_ticker() -> Interval {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

// =============================================================================
// Task
// =============================================================================

/// Sends one request and reports exactly one [`TestResult`], whatever the
/// outcome.
async fn run_task<C, S>(
    config: Arc<BenchConfig>,
    client: Arc<C>,
    source: Arc<S>,
    results: mpsc::Sender<TestResult>,
    timed_out: mpsc::Sender<SearchRequest>,
) where
    C: SearchClient,
    S: RequestSource,
{
    let request = source.next_request();

    let start = Instant::now();
    let outcome = client.search(&request).await;
    let cost = start.elapsed();

    let result = match outcome {
        Ok(response) => TestResult::success(cost, response.item_count()),
        Err(e) => {
            debug!("Search failed after {:?}: {}", cost, e);
            TestResult::failure(e, cost)
        }
    };

    // Offered before the result is sent, so the timed-out buffer is complete
    // once every result has been drained.
    if config.is_timeout(cost) && timed_out.try_send(request).is_err() {
        debug!("Timed-out request buffer full, payload dropped");
    }

    if results.send(result).await.is_err() {
        warn!("Result collector closed, result dropped");
    }
}
