//! Integration tests for junosight-common library.

use junosight_common::{LogFormat, LoggingConfig, MetricKind, MetricSample, parse_config};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    samples: Vec<MetricSample>,
}

#[test]
fn test_config_with_samples_roundtrip_through_json5() {
    let content = r#"
    {
        logging: { level: "warn", format: "json" },
        samples: [
            { name: "up", kind: "gauge", value: 1.0, labels: [["target", "r1"]] },
            { name: "alarms_total", kind: "counter", value: 3.0 },
        ],
    }
    "#;

    let config: AppConfig = parse_config(content).expect("parse failed");

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.samples.len(), 2);
    assert_eq!(config.samples[0].label("target"), Some("r1"));
    assert_eq!(config.samples[1].kind, MetricKind::Counter);
    assert!(config.samples[1].labels.is_empty());
}

#[test]
fn test_builder_matches_literal() {
    let built = MetricSample::gauge("up", 0.0).with_label("target", "r2");
    let literal = MetricSample {
        name: "up".to_string(),
        kind: MetricKind::Gauge,
        value: 0.0,
        labels: vec![("target".to_string(), "r2".to_string())],
    };

    assert_eq!(built, literal);
}
