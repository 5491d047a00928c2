//! Scrape orchestration across all configured devices.
//!
//! One scrape cycle spawns a task per device. Each task acquires the
//! device's pooled connection and runs its collectors one after another.
//! Tasks return their samples, which are merged into one sink at join time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use junosight_common::{Label, MetricSample};
use junosight_ssh::{CommandClient, ConnectionPool, Device, Dialer, SshDialer};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, trace, warn};

use crate::feature::FeatureCollector;
use crate::sink::{ScrapeSink, SharedSink};

/// A device together with the collectors enabled for it.
#[derive(Clone)]
pub struct ScrapeTarget {
    pub device: Arc<Device>,
    pub collectors: Vec<Arc<dyn FeatureCollector>>,
}

impl ScrapeTarget {
    pub fn new(device: Arc<Device>, collectors: Vec<Arc<dyn FeatureCollector>>) -> Self {
        Self { device, collectors }
    }

    fn host(&self) -> &str {
        &self.device.host
    }
}

/// Runs scrape cycles against a connection pool.
pub struct Scraper<D: Dialer = SshDialer> {
    pool: Arc<ConnectionPool<D>>,
    targets: Vec<Arc<ScrapeTarget>>,
    prefix: String,
    collector_timeout: Option<Duration>,
}

impl<D: Dialer> Scraper<D> {
    /// Create a scraper. Metric names are prefixed with `prefix`.
    pub fn new(
        pool: Arc<ConnectionPool<D>>,
        targets: Vec<ScrapeTarget>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            targets: targets.into_iter().map(Arc::new).collect(),
            prefix: prefix.into(),
            collector_timeout: None,
        }
    }

    /// Bound the collector phase of each device. `None` leaves it unbounded.
    pub fn with_collector_timeout(mut self, limit: Option<Duration>) -> Self {
        self.collector_timeout = limit;
        self
    }

    /// The shared connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool<D>> {
        &self.pool
    }

    /// Whether `host` is a configured device.
    pub fn has_target(&self, host: &str) -> bool {
        self.targets.iter().any(|t| t.host() == host)
    }

    /// Number of configured devices.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Run one scrape cycle over every device, or only `only` when given.
    ///
    /// Every scraped device contributes exactly one `up` and one
    /// `scrape_duration_seconds` sample, whatever happens inside its task.
    pub async fn scrape(&self, only: Option<&str>) -> SharedSink {
        let started = Instant::now();
        let sink: SharedSink = Arc::new(ScrapeSink::new(self.prefix.clone()));
        let mut tasks = JoinSet::new();
        let mut hosts = HashMap::new();

        for target in &self.targets {
            if only.is_some_and(|host| host != target.host()) {
                continue;
            }

            let pool = self.pool.clone();
            let target = target.clone();
            let limit = self.collector_timeout;
            let host = target.host().to_string();

            let handle = tasks.spawn(scrape_device(pool, target, limit));
            hosts.insert(handle.id(), (host, Instant::now()));
        }

        let devices = hosts.len();

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, samples)) => {
                    hosts.remove(&id);
                    sink.extend(samples);
                }
                Err(e) => {
                    let Some((host, spawned)) = hosts.remove(&e.id()) else {
                        continue;
                    };
                    error!(device = %host, error = %e, "Scrape task failed");
                    let labels = target_labels(&host);
                    sink.gauge("up", 0.0, labels.clone());
                    sink.gauge(
                        "scrape_duration_seconds",
                        spawned.elapsed().as_secs_f64(),
                        labels,
                    );
                }
            }
        }

        debug!(
            devices,
            samples = sink.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Scrape complete"
        );

        sink
    }
}

fn target_labels(host: &str) -> Vec<Label> {
    vec![("target".to_string(), host.to_string())]
}

/// Scrape one device and return its samples.
async fn scrape_device<D: Dialer>(
    pool: Arc<ConnectionPool<D>>,
    target: Arc<ScrapeTarget>,
    limit: Option<Duration>,
) -> Vec<MetricSample> {
    let started = Instant::now();
    let host = target.host();
    let labels = target_labels(host);
    let sink = ScrapeSink::new("");

    match pool.acquire(&target.device).await {
        Ok(conn) => {
            sink.gauge("up", 1.0, labels.clone());
            let client = CommandClient::new(conn);
            let deadline = limit.map(|limit| Instant::now() + limit);
            run_collectors(&client, &target.collectors, &sink, &labels, deadline).await;
        }
        Err(e) => {
            warn!(device = %host, error = %e, "Device unreachable");
            sink.gauge("up", 0.0, labels.clone());
        }
    }

    sink.gauge(
        "scrape_duration_seconds",
        started.elapsed().as_secs_f64(),
        labels,
    );

    sink.into_samples()
}

/// Run `collectors` in order. A failing collector is logged and skipped;
/// the rest still run. Past `deadline` the running collector is cancelled
/// and the remaining ones are skipped.
async fn run_collectors(
    client: &CommandClient,
    collectors: &[Arc<dyn FeatureCollector>],
    sink: &ScrapeSink,
    labels: &[Label],
    deadline: Option<Instant>,
) {
    let host = client.host();

    for (idx, collector) in collectors.iter().enumerate() {
        let name = collector.name();
        let started = Instant::now();

        let result = match deadline {
            Some(deadline) => timeout_at(deadline, collector.collect(client, sink, labels))
                .await
                .ok(),
            None => Some(collector.collect(client, sink, labels).await),
        };

        let mut duration_labels = labels.to_vec();
        duration_labels.push(("collector".to_string(), name.to_string()));
        sink.gauge(
            "collector_duration_seconds",
            started.elapsed().as_secs_f64(),
            duration_labels,
        );

        match result {
            Some(Ok(())) => trace!(device = %host, collector = name, "Collector finished"),
            Some(Err(e)) if e.is_benign() => {
                debug!(device = %host, collector = name, error = %e, "Collector skipped")
            }
            Some(Err(e)) => error!(device = %host, collector = name, error = %e, "Collector failed"),
            None => {
                let skipped: Vec<&str> = collectors[idx + 1..].iter().map(|c| c.name()).collect();
                warn!(
                    device = %host,
                    collector = name,
                    skipped = ?skipped,
                    "Scrape timeout reached, cancelling collectors"
                );
                break;
            }
        }
    }
}

/// Log a one-line summary of the configured targets.
pub fn log_targets(targets: &[ScrapeTarget]) {
    for target in targets {
        let collectors: Vec<&str> = target.collectors.iter().map(|c| c.name()).collect();
        info!(
            device = %target.device.host,
            address = %target.device.address(),
            collectors = ?collectors,
            "Configured device"
        );
    }
}
