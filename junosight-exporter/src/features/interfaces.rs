//! Physical interface state and traffic counters.

use std::sync::Arc;

use async_trait::async_trait;
use junosight_common::Label;
use junosight_ssh::CommandClient;
use serde::Deserialize;
use tracing::trace;

use super::xml::{decode, number, text};
use crate::feature::{FeatureCollector, FeatureError};
use crate::labels::DynamicLabelRegistry;
use crate::sink::ScrapeSink;

const COMMAND: &str = "show interfaces statistics detail";

/// Label names set by this collector. Dynamic labels with these names are
/// dropped.
const FIXED_LABELS: &[&str] = &["target", "name", "description", "mac"];

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(rename = "interface-information", default)]
    information: Option<InterfaceInformation>,
}

#[derive(Debug, Default, Deserialize)]
struct InterfaceInformation {
    #[serde(rename = "physical-interface", default)]
    interfaces: Vec<PhysicalInterface>,
}

/// Element text; attributes such as `junos:format` are ignored.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PhysicalInterface {
    name: String,
    #[serde(default)]
    admin_status: Option<Text>,
    #[serde(default)]
    oper_status: Option<Text>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    current_physical_address: Option<String>,
    #[serde(default)]
    traffic_statistics: Option<TrafficStatistics>,
    #[serde(default)]
    input_error_list: Option<InputErrors>,
    #[serde(default)]
    output_error_list: Option<OutputErrors>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TrafficStatistics {
    #[serde(default)]
    input_bytes: Option<String>,
    #[serde(default)]
    output_bytes: Option<String>,
    #[serde(default)]
    input_packets: Option<String>,
    #[serde(default)]
    output_packets: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct InputErrors {
    #[serde(default)]
    input_errors: Option<String>,
    #[serde(default)]
    input_drops: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct OutputErrors {
    #[serde(default)]
    output_errors: Option<String>,
    #[serde(default)]
    output_drops: Option<String>,
}

fn is_up(status: Option<&Text>) -> f64 {
    match status.map(|s| s.value.trim()) {
        Some("up") => 1.0,
        _ => 0.0,
    }
}

/// Collects `interface_*` metrics for every physical interface.
pub struct InterfacesCollector {
    registry: Option<Arc<DynamicLabelRegistry>>,
}

impl InterfacesCollector {
    /// `registry` enables dynamic labels from interface descriptions.
    pub fn new(registry: Option<Arc<DynamicLabelRegistry>>) -> Self {
        Self { registry }
    }

    fn labels(&self, host: &str, base: &[Label], iface: &PhysicalInterface) -> Vec<Label> {
        let name = text(Some(iface.name.as_str()));
        let mut labels = base.to_vec();
        labels.push(("name".to_string(), name.to_string()));
        labels.push((
            "description".to_string(),
            text(iface.description.as_deref()).to_string(),
        ));
        labels.push((
            "mac".to_string(),
            text(iface.current_physical_address.as_deref()).to_string(),
        ));

        if let Some(registry) = &self.registry {
            labels.extend(
                registry
                    .labels_for_interface(host, name)
                    .into_iter()
                    .filter(|(k, _)| !FIXED_LABELS.contains(&k.as_str())),
            );
        }

        labels
    }
}

#[async_trait]
impl FeatureCollector for InterfacesCollector {
    fn name(&self) -> &'static str {
        "interfaces"
    }

    async fn collect(
        &self,
        client: &CommandClient,
        sink: &ScrapeSink,
        labels: &[Label],
    ) -> Result<(), FeatureError> {
        let reply: Reply = client.execute(COMMAND, decode::<Reply>).await?;
        let interfaces = reply.information.unwrap_or_default().interfaces;
        let host = client.host();

        // Record every description first so all interfaces of this device
        // render against the same schema.
        if let Some(registry) = &self.registry {
            for iface in &interfaces {
                registry.parse_description(
                    host,
                    text(Some(iface.name.as_str())),
                    text(iface.description.as_deref()),
                );
            }
        }

        for iface in &interfaces {
            let labels = self.labels(host, labels, iface);

            sink.gauge("interface_up", is_up(iface.oper_status.as_ref()), labels.clone());
            sink.gauge(
                "interface_admin_up",
                is_up(iface.admin_status.as_ref()),
                labels.clone(),
            );

            let traffic = iface.traffic_statistics.as_ref();
            let input = iface.input_error_list.as_ref();
            let output = iface.output_error_list.as_ref();

            let counters = [
                ("interface_receive_bytes", traffic.and_then(|t| t.input_bytes.as_deref())),
                ("interface_transmit_bytes", traffic.and_then(|t| t.output_bytes.as_deref())),
                ("interface_receive_packets", traffic.and_then(|t| t.input_packets.as_deref())),
                ("interface_transmit_packets", traffic.and_then(|t| t.output_packets.as_deref())),
                ("interface_receive_errors", input.and_then(|e| e.input_errors.as_deref())),
                ("interface_receive_drops", input.and_then(|e| e.input_drops.as_deref())),
                ("interface_transmit_errors", output.and_then(|e| e.output_errors.as_deref())),
                ("interface_transmit_drops", output.and_then(|e| e.output_drops.as_deref())),
            ];

            for (metric, raw) in counters {
                if let Some(value) = number(raw) {
                    sink.counter(metric, value, labels.clone());
                }
            }
        }

        trace!(device = %host, interfaces = interfaces.len(), "Collected interfaces");
        Ok(())
    }
}
