use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Self-observability of the poll pipeline, exported on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub hostmetrics_polls_total: Counter,
    pub hostmetrics_poll_failures_total: CounterVec,
    pub hostmetrics_history_records_total: Counter,
    pub hostmetrics_history_write_errors_total: Counter,
    pub hostmetrics_last_poll_duration_seconds: Gauge,
    pub hostmetrics_last_success_timestamp_seconds: Gauge,
    pub hostmetrics_uptime_seconds: Gauge,
    pub hostmetrics_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let hostmetrics_polls_total = Counter::with_opts(opts!(
            "hostmetrics_polls_total",
            "Completed poll cycles, successful or not"
        ))?;
        let hostmetrics_poll_failures_total = CounterVec::new(
            opts!(
                "hostmetrics_poll_failures_total",
                "Failed poll cycles by stage (invoke, parse, panic)"
            ),
            &["stage"],
        )?;
        let hostmetrics_history_records_total = Counter::with_opts(opts!(
            "hostmetrics_history_records_total",
            "Snapshots appended to the history log"
        ))?;
        let hostmetrics_history_write_errors_total = Counter::with_opts(opts!(
            "hostmetrics_history_write_errors_total",
            "Failed appends to the history log"
        ))?;
        let hostmetrics_last_poll_duration_seconds = Gauge::with_opts(opts!(
            "hostmetrics_last_poll_duration_seconds",
            "Wall time of the most recent poll cycle"
        ))?;
        let hostmetrics_last_success_timestamp_seconds = Gauge::with_opts(opts!(
            "hostmetrics_last_success_timestamp_seconds",
            "Unix time of the most recent successful poll"
        ))?;
        let hostmetrics_uptime_seconds = Gauge::with_opts(opts!(
            "hostmetrics_uptime_seconds",
            "Seconds since the service started"
        ))?;
        let hostmetrics_scrape_count_total = Counter::with_opts(opts!(
            "hostmetrics_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &hostmetrics_polls_total)?;
        register(&registry, &hostmetrics_poll_failures_total)?;
        register(&registry, &hostmetrics_history_records_total)?;
        register(&registry, &hostmetrics_history_write_errors_total)?;
        register(&registry, &hostmetrics_last_poll_duration_seconds)?;
        register(&registry, &hostmetrics_last_success_timestamp_seconds)?;
        register(&registry, &hostmetrics_uptime_seconds)?;
        register(&registry, &hostmetrics_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            hostmetrics_polls_total,
            hostmetrics_poll_failures_total,
            hostmetrics_history_records_total,
            hostmetrics_history_write_errors_total,
            hostmetrics_last_poll_duration_seconds,
            hostmetrics_last_success_timestamp_seconds,
            hostmetrics_uptime_seconds,
            hostmetrics_scrape_count_total,
        }))
    }

    pub fn observe_poll(&self, elapsed: Duration) {
        self.hostmetrics_polls_total.inc();
        self.hostmetrics_last_poll_duration_seconds
            .set(elapsed.as_secs_f64());
    }

    pub fn mark_success(&self) {
        self.hostmetrics_last_success_timestamp_seconds
            .set(now_unix() as f64);
    }

    pub fn inc_poll_failure(&self, stage: &str) {
        self.hostmetrics_poll_failures_total
            .with_label_values(&[stage])
            .inc();
    }

    pub fn inc_history(&self, written: bool) {
        if written {
            self.hostmetrics_history_records_total.inc();
        } else {
            self.hostmetrics_history_write_errors_total.inc();
        }
    }

    pub fn inc_scrape_count(&self) {
        self.hostmetrics_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let uptime = now_unix().saturating_sub(self.started_at_unix) as f64;
        self.hostmetrics_uptime_seconds.set(uptime);

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
