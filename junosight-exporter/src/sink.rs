//! Per-scrape sample accumulator and text exposition rendering.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use junosight_common::{Label, MetricKind, MetricSample};
use parking_lot::Mutex;

use crate::mapping::{build_metric_name, escape_label_value, format_value, sanitize_label_name};

/// Thread-safe collection of samples produced during one scrape.
///
/// Device tasks and feature collectors emit into the same sink concurrently;
/// the HTTP handler renders it once the scrape has joined.
#[derive(Debug)]
pub struct ScrapeSink {
    prefix: String,
    samples: Mutex<Vec<MetricSample>>,
}

/// Shareable sink handle.
pub type SharedSink = Arc<ScrapeSink>;

impl ScrapeSink {
    /// Create an empty sink. `prefix` is prepended to every metric name.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Emit one sample.
    pub fn emit(&self, sample: MetricSample) {
        self.samples.lock().push(sample);
    }

    /// Emit a gauge.
    pub fn gauge(&self, name: &str, value: f64, labels: Vec<Label>) {
        self.emit(MetricSample::gauge(name, value).with_labels(labels));
    }

    /// Emit a counter.
    pub fn counter(&self, name: &str, value: f64, labels: Vec<Label>) {
        self.emit(MetricSample::counter(name, value).with_labels(labels));
    }

    /// Emit a batch of samples, keeping their order.
    pub fn extend(&self, samples: impl IntoIterator<Item = MetricSample>) {
        self.samples.lock().extend(samples);
    }

    /// Consume the sink, returning its samples in emission order.
    pub fn into_samples(self) -> Vec<MetricSample> {
        self.samples.into_inner()
    }

    /// Number of samples emitted so far.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Snapshot of all samples in emission order.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().clone()
    }

    /// Samples with the given (unprefixed) name.
    pub fn find(&self, name: &str) -> Vec<MetricSample> {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Render all samples in the text exposition format.
    ///
    /// Families are sorted by name and get one `# TYPE` line taken from their
    /// first sample. Every sample renders its own label names, so samples of
    /// one family may carry different label sets.
    pub fn render(&self) -> String {
        let samples = self.samples.lock();
        let mut output = Vec::with_capacity(samples.len() * 100);

        let mut by_name: BTreeMap<String, Vec<&MetricSample>> = BTreeMap::new();
        for sample in samples.iter() {
            by_name
                .entry(build_metric_name(&self.prefix, &sample.name))
                .or_default()
                .push(sample);
        }

        for (name, series) in &by_name {
            let kind = series.first().map(|s| s.kind).unwrap_or(MetricKind::Gauge);
            writeln!(output, "# TYPE {} {}", name, kind.as_str()).ok();

            for sample in series {
                writeln!(
                    output,
                    "{}{} {}",
                    name,
                    format_labels(&sample.labels),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        String::from_utf8(output).unwrap_or_default()
    }
}

/// Format labels as `{k="v",...}`. Later duplicates of a name are dropped.
fn format_labels(labels: &[Label]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let mut seen = HashSet::with_capacity(labels.len());
    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| (sanitize_label_name(k), v))
        .filter(|(k, _)| seen.insert(k.clone()))
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
