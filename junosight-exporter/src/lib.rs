//! Prometheus exporter for Junos devices scraped over SSH.
//!
//! Every request to the metrics endpoint runs one scrape cycle: each
//! configured device is scraped concurrently over its pooled SSH session,
//! the enabled feature collectors run in order, and the collected samples are
//! rendered in the text exposition format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP Server   │────>│     Scraper     │────>│ Connection Pool │
//! │   (/metrics)    │     │ (task per dev.) │     │  (SSH sessions) │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                  │
//!                                  v
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │   Collectors    │────>│  Label Registry │
//!                         │ (interfaces...) │     │   (dynamic)     │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! junosight --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod config;
pub mod feature;
pub mod features;
pub mod http;
pub mod labels;
pub mod mapping;
pub mod scrape;
pub mod sink;

pub use config::ExporterConfig;
pub use feature::{FeatureCatalog, FeatureCollector, FeatureError};
pub use http::HttpServer;
pub use labels::DynamicLabelRegistry;
pub use scrape::{ScrapeTarget, Scraper};
pub use sink::{ScrapeSink, SharedSink};

use std::sync::Arc;

use junosight_ssh::{ConnectionPool, Dialer};

/// Build the scrape targets and scraper described by `config`.
///
/// Collectors are built once and shared by every device that enables them.
/// Returns the label registry when dynamic labels are enabled.
pub fn build_scraper<D: Dialer>(
    config: &ExporterConfig,
    pool: Arc<ConnectionPool<D>>,
) -> Result<(Scraper<D>, Option<Arc<DynamicLabelRegistry>>), config::ConfigError> {
    let registry = if config.labels.dynamic {
        let registry = DynamicLabelRegistry::from_pattern(&config.labels.description_pattern)
            .map_err(|e| {
                config::ConfigError::Validation(format!("Invalid description_pattern: {}", e))
            })?;
        Some(Arc::new(registry))
    } else {
        None
    };

    let devices = config.devices()?;
    let mut enabled: Vec<String> = Vec::new();
    for device in &devices {
        for name in config.features_for(&device.host) {
            if !enabled.contains(&name) {
                enabled.push(name);
            }
        }
    }

    let catalog = FeatureCatalog::builtin(&enabled, registry.clone());
    let targets: Vec<ScrapeTarget> = devices
        .into_iter()
        .map(|device| {
            let collectors = catalog.select(&config.features_for(&device.host));
            ScrapeTarget::new(device, collectors)
        })
        .collect();

    scrape::log_targets(&targets);

    let scraper = Scraper::new(pool, targets, config.prometheus.prefix.clone())
        .with_collector_timeout(config.scrape_timeout());

    Ok((scraper, registry))
}
