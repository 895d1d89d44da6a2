use crate::collectors::Collector;
use crate::history::HistoryRecorder;
use crate::metrics::Metrics;
use crate::parser;
use crate::state::{Snapshot, SnapshotCache};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sole writer of the [`SnapshotCache`].
#[derive(Clone)]
pub struct Poller {
    collector: Arc<dyn Collector>,
    cache: SnapshotCache,
    history: HistoryRecorder,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        collector: Arc<dyn Collector>,
        cache: SnapshotCache,
        history: HistoryRecorder,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            cache,
            history,
            metrics,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            collector = %self.collector.describe(),
            history = %self.history.path().display(),
            "запуск цикла опроса"
        );
        loop {
            self.poll_once().await;
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("получен сигнал остановки цикла опроса");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    pub async fn run_cycles(&self, cycles: usize) {
        for i in 0..cycles {
            self.poll_once().await;
            if i + 1 < cycles {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// One poll cycle. The cycle runs in its own task so that a panic is
    /// observed here as a `JoinError` instead of unwinding the loop.
    pub async fn poll_once(&self) -> Snapshot {
        let started = Instant::now();
        let this = self.clone();
        let mut cycle = CycleTask(tokio::spawn(async move { this.cycle().await }));
        let snapshot = match (&mut cycle.0).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "poll cycle aborted");
                self.metrics.inc_poll_failure("panic");
                let snapshot = Snapshot::failure(format!("Unexpected error in poll loop: {err}"));
                self.cache.write(snapshot.clone()).await;
                snapshot
            }
        };
        self.metrics.observe_poll(started.elapsed());
        snapshot
    }

    async fn cycle(&self) -> Snapshot {
        let raw = match self.collector.invoke().await {
            Ok(raw) => raw,
            Err(err) => {
                self.metrics.inc_poll_failure("invoke");
                let snapshot = Snapshot::failure(err.to_string());
                self.cache.write(snapshot.clone()).await;
                return snapshot;
            }
        };

        let data = match parser::parse(&raw) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "collector output rejected");
                self.metrics.inc_poll_failure("parse");
                let snapshot = Snapshot::failure(err.to_string());
                self.cache.write(snapshot.clone()).await;
                return snapshot;
            }
        };

        let snapshot = Snapshot::success(data);
        self.cache.write(snapshot.clone()).await;
        self.metrics.mark_success();
        debug!(timestamp = ?snapshot.timestamp, "metrics updated");

        let written = self.history.record(&snapshot).await;
        self.metrics.inc_history(written);
        snapshot
    }
}

/// Aborts the spawned cycle when `poll_once` is dropped mid-flight.
struct CycleTask(JoinHandle<Snapshot>);

impl Drop for CycleTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}
