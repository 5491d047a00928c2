use serde::{Deserialize, Serialize};

/// A label as a `(name, value)` pair.
pub type Label = (String, String);

/// A single labelled metric sample produced during a scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name without the exporter prefix (e.g., "up", "interface_receive_bytes").
    pub name: String,

    /// Sample kind.
    pub kind: MetricKind,

    /// The measured value.
    pub value: f64,

    /// Ordered labels. Every sample carries its own label names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

impl MetricSample {
    /// Create a gauge sample without labels.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            value,
            labels: Vec::new(),
        }
    }

    /// Create a counter sample without labels.
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Counter,
            value,
            labels: Vec::new(),
        }
    }

    /// Add a label to this sample.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Add multiple labels to this sample, preserving their order.
    pub fn with_labels<I>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = Label>,
    {
        self.labels.extend(labels);
        self
    }

    /// Look up a label value by name.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sample kind as understood by the exposition format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    /// Get the TYPE comment string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let sample = MetricSample::gauge("up", 1.0)
            .with_label("target", "router01")
            .with_label("collector", "alarm");

        assert_eq!(sample.name, "up");
        assert_eq!(sample.kind, MetricKind::Gauge);
        assert_eq!(sample.value, 1.0);
        assert_eq!(sample.label("target"), Some("router01"));
        assert_eq!(sample.label("missing"), None);
    }

    #[test]
    fn test_label_order_is_preserved() {
        let sample = MetricSample::counter("interface_receive_bytes", 10.0).with_labels(vec![
            ("target".to_string(), "r1".to_string()),
            ("name".to_string(), "ge-0/0/0".to_string()),
            ("peer".to_string(), "coreA".to_string()),
        ]);

        let names: Vec<_> = sample.labels.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["target", "name", "peer"]);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Counter.as_str(), "counter");
    }
}
