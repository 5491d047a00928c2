//! Active system alarms.

use std::collections::BTreeMap;

use async_trait::async_trait;
use junosight_common::Label;
use junosight_ssh::CommandClient;
use serde::Deserialize;

use super::xml::{decode, text};
use crate::feature::{FeatureCollector, FeatureError};
use crate::sink::ScrapeSink;

const COMMAND: &str = "show system alarms";

/// Classes always exported, so a cleared alarm drops to zero instead of
/// disappearing.
const KNOWN_CLASSES: &[&str] = &["major", "minor"];

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(rename = "alarm-information", default)]
    information: Option<AlarmInformation>,
}

#[derive(Debug, Default, Deserialize)]
struct AlarmInformation {
    #[serde(rename = "alarm-detail", default)]
    details: Vec<AlarmDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AlarmDetail {
    #[serde(default)]
    alarm_class: Option<String>,
}

/// Collects `alarms_count{class}` and `alarms_total`.
pub struct AlarmCollector;

#[async_trait]
impl FeatureCollector for AlarmCollector {
    fn name(&self) -> &'static str {
        "alarm"
    }

    async fn collect(
        &self,
        client: &CommandClient,
        sink: &ScrapeSink,
        labels: &[Label],
    ) -> Result<(), FeatureError> {
        let reply: Reply = client.execute(COMMAND, decode::<Reply>).await?;
        let details = reply.information.unwrap_or_default().details;

        let mut counts: BTreeMap<String, u64> = KNOWN_CLASSES
            .iter()
            .map(|class| (class.to_string(), 0))
            .collect();
        for detail in &details {
            let class = text(detail.alarm_class.as_deref()).to_lowercase();
            let class = if class.is_empty() {
                "unknown".to_string()
            } else {
                class
            };
            *counts.entry(class).or_default() += 1;
        }

        for (class, count) in counts {
            let mut labels = labels.to_vec();
            labels.push(("class".to_string(), class));
            sink.gauge("alarms_count", count as f64, labels);
        }
        sink.gauge("alarms_total", details.len() as f64, labels.to_vec());

        Ok(())
    }
}
