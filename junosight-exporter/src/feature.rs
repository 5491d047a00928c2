//! Feature collector trait and the per-process collector catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use junosight_common::Label;
use junosight_ssh::{CommandClient, ConnectError};
use thiserror::Error;

use crate::features::{AlarmCollector, InterfacesCollector};
use crate::labels::DynamicLabelRegistry;
use crate::sink::ScrapeSink;

/// Names of the built-in collectors, in the order they run on a device.
pub const FEATURE_NAMES: &[&str] = &["interfaces", "alarm"];

/// Errors returned by a feature collector.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("Failed to parse reply: {0}")]
    Parse(String),
    /// The device returned nothing for the command, usually because the
    /// feature is not supported there.
    #[error("No more data")]
    NoMoreData,
}

impl FeatureError {
    /// Whether this error is an expected outcome rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, FeatureError::NoMoreData)
    }
}

/// One monitoring domain: issues its command(s) and emits samples.
#[async_trait]
pub trait FeatureCollector: Send + Sync {
    /// Stable collector name, used in logs and the `collector` label.
    fn name(&self) -> &'static str;

    /// Collect from one device. `labels` are attached to every sample.
    async fn collect(
        &self,
        client: &CommandClient,
        sink: &ScrapeSink,
        labels: &[Label],
    ) -> Result<(), FeatureError>;
}

/// Collectors built once per process and shared by name across devices.
#[derive(Clone, Default)]
pub struct FeatureCatalog {
    order: Vec<&'static str>,
    collectors: HashMap<&'static str, Arc<dyn FeatureCollector>>,
}

impl FeatureCatalog {
    /// Catalog of the given collectors. Order is preserved; a later
    /// collector with an already registered name is ignored.
    pub fn new(collectors: Vec<Arc<dyn FeatureCollector>>) -> Self {
        let mut catalog = Self::default();
        for collector in collectors {
            let name = collector.name();
            if catalog.collectors.contains_key(name) {
                continue;
            }
            catalog.order.push(name);
            catalog.collectors.insert(name, collector);
        }
        catalog
    }

    /// Build the built-in collectors named in `enabled`.
    ///
    /// The interfaces collector feeds descriptions to `registry` when one is
    /// given.
    pub fn builtin(enabled: &[String], registry: Option<Arc<DynamicLabelRegistry>>) -> Self {
        let mut collectors: Vec<Arc<dyn FeatureCollector>> = Vec::new();

        for name in FEATURE_NAMES {
            if !enabled.iter().any(|e| e == name) {
                continue;
            }
            match *name {
                "interfaces" => {
                    collectors.push(Arc::new(InterfacesCollector::new(registry.clone())))
                }
                "alarm" => collectors.push(Arc::new(AlarmCollector)),
                _ => {}
            }
        }

        Self::new(collectors)
    }

    /// Collector registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FeatureCollector>> {
        self.collectors.get(name).cloned()
    }

    /// Registered collector names, in catalog order.
    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// Shared handles for `names`, in catalog order. Unknown names are skipped.
    pub fn select(&self, names: &[String]) -> Vec<Arc<dyn FeatureCollector>> {
        self.order
            .iter()
            .filter(|name| names.iter().any(|n| n == *name))
            .filter_map(|name| self.collectors.get(name).cloned())
            .collect()
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no collector is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
