//! Configuration for the exporter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use junosight_common::LoggingConfig;
use junosight_ssh::{AuthMethod, DEFAULT_PORT, Device, PoolConfig};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::feature::FEATURE_NAMES;
use crate::labels::DEFAULT_DESCRIPTION_PATTERN;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterConfig {
    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Global SSH settings, inherited by every device.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Devices to scrape.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Feature collectors enabled by default.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Dynamic interface labels.
    #[serde(default)]
    pub labels: LabelsConfig,

    /// Scrape settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9326").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "junos").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9326".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "junos".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

/// Global SSH settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Login user.
    #[serde(default)]
    pub username: String,

    /// Password, used when no key file is configured.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Private key file.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Passphrase for an encrypted key file.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub key_passphrase: Option<SecretString>,

    /// SSH port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Dial and authentication timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Minimum delay between dials to a host after a failure (seconds).
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// How often idle connections are probed (seconds).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Probe timeout (seconds).
    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    /// Close connections unused for this long (seconds).
    #[serde(default = "default_idle_expiry")]
    pub idle_expiry_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_reconnect_interval() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    10
}

fn default_keepalive_timeout() -> u64 {
    5
}

fn default_idle_expiry() -> u64 {
    300 // 5 minutes
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: None,
            key_file: None,
            key_passphrase: None,
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_interval_secs: default_reconnect_interval(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            idle_expiry_secs: default_idle_expiry(),
        }
    }
}

/// One device entry. Unset fields fall back to the global `ssh` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub key_passphrase: Option<SecretString>,

    /// Collectors for this device, replacing the global `features` set.
    #[serde(default)]
    pub features: Option<Vec<String>>,
}

/// Collectors enabled for devices without an explicit list.
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub interfaces: bool,

    #[serde(default = "default_true")]
    pub alarm: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            interfaces: true,
            alarm: true,
        }
    }
}

impl FeaturesConfig {
    /// Names of the enabled collectors, in catalog order.
    pub fn enabled(&self) -> Vec<String> {
        FEATURE_NAMES
            .iter()
            .filter(|name| match **name {
                "interfaces" => self.interfaces,
                "alarm" => self.alarm,
                _ => false,
            })
            .map(|name| name.to_string())
            .collect()
    }
}

/// Dynamic interface label settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsConfig {
    /// Extract labels from interface descriptions.
    #[serde(default = "default_true")]
    pub dynamic: bool,

    /// Pattern with the tag name as group 1 and an optional value as group 2.
    #[serde(default = "default_description_pattern")]
    pub description_pattern: String,
}

fn default_description_pattern() -> String {
    DEFAULT_DESCRIPTION_PATTERN.to_string()
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            dynamic: true,
            description_pattern: default_description_pattern(),
        }
    }
}

/// Scrape settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// Upper bound for the collector phase of one device (seconds, 0 = unbounded).
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
}

fn default_scrape_timeout() -> u64 {
    60
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.prometheus.path == "/health" {
            return Err(ConfigError::Validation(
                "Metrics path must not be /health".to_string(),
            ));
        }

        for (name, value) in [
            ("connect_timeout_secs", self.ssh.connect_timeout_secs),
            ("keepalive_interval_secs", self.ssh.keepalive_interval_secs),
            ("keepalive_timeout_secs", self.ssh.keepalive_timeout_secs),
            ("idle_expiry_secs", self.ssh.idle_expiry_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }

        if self.ssh.keepalive_timeout_secs >= self.ssh.keepalive_interval_secs {
            return Err(ConfigError::Validation(format!(
                "keepalive_timeout_secs ({}) must be shorter than keepalive_interval_secs ({})",
                self.ssh.keepalive_timeout_secs, self.ssh.keepalive_interval_secs
            )));
        }

        if self.ssh.idle_expiry_secs <= self.ssh.keepalive_timeout_secs {
            return Err(ConfigError::Validation(format!(
                "idle_expiry_secs ({}) must be longer than keepalive_timeout_secs ({})",
                self.ssh.idle_expiry_secs, self.ssh.keepalive_timeout_secs
            )));
        }

        if let Err(e) = Regex::new(&self.labels.description_pattern) {
            return Err(ConfigError::Validation(format!(
                "Invalid description_pattern: {}",
                e
            )));
        }

        let mut hosts = HashSet::new();
        for device in &self.devices {
            if !hosts.insert(device.host.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device host: {}",
                    device.host
                )));
            }

            if let Some(features) = &device.features
                && let Some(unknown) = features
                    .iter()
                    .find(|f| !FEATURE_NAMES.contains(&f.as_str()))
            {
                return Err(ConfigError::Validation(format!(
                    "Unknown feature '{}' for device {}",
                    unknown, device.host
                )));
            }
        }

        self.devices()?;

        Ok(())
    }

    /// Build the device inventory, resolving inherited credentials.
    ///
    /// Per-device credentials win over global ones; within one level a key
    /// file wins over a password.
    pub fn devices(&self) -> Result<Vec<Arc<Device>>, ConfigError> {
        self.devices
            .iter()
            .map(|entry| self.resolve_device(entry).map(Arc::new))
            .collect()
    }

    fn resolve_device(&self, entry: &DeviceConfig) -> Result<Device, ConfigError> {
        if entry.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Device host must not be empty".to_string(),
            ));
        }

        let username = entry
            .username
            .clone()
            .unwrap_or_else(|| self.ssh.username.clone());
        if username.is_empty() {
            return Err(ConfigError::Validation(format!(
                "No username configured for device {}",
                entry.host
            )));
        }

        let auth = auth_method(
            entry.key_file.as_ref(),
            entry.key_passphrase.as_ref(),
            entry.password.as_ref(),
        )
        .or_else(|| {
            auth_method(
                self.ssh.key_file.as_ref(),
                self.ssh.key_passphrase.as_ref(),
                self.ssh.password.as_ref(),
            )
        })
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "No password or key_file configured for device {}",
                entry.host
            ))
        })?;

        Ok(Device {
            host: entry.host.clone(),
            port: entry.port.unwrap_or(self.ssh.port),
            username,
            auth,
        })
    }

    /// Collectors configured for `host`, in catalog order.
    pub fn features_for(&self, host: &str) -> Vec<String> {
        let explicit = self
            .devices
            .iter()
            .find(|d| d.host == host)
            .and_then(|d| d.features.as_ref());

        match explicit {
            Some(features) => FEATURE_NAMES
                .iter()
                .filter(|name| features.iter().any(|f| f == *name))
                .map(|name| name.to_string())
                .collect(),
            None => self.features.enabled(),
        }
    }

    /// Connection pool timings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            reconnect_interval: Duration::from_secs(self.ssh.reconnect_interval_secs),
            keepalive_interval: Duration::from_secs(self.ssh.keepalive_interval_secs),
            keepalive_timeout: Duration::from_secs(self.ssh.keepalive_timeout_secs),
            idle_expiry: Duration::from_secs(self.ssh.idle_expiry_secs),
        }
    }

    /// Dial and authentication timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }

    /// Collector phase bound per device, if any.
    pub fn scrape_timeout(&self) -> Option<Duration> {
        match self.scrape.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn auth_method(
    key_file: Option<&PathBuf>,
    passphrase: Option<&SecretString>,
    password: Option<&SecretString>,
) -> Option<AuthMethod> {
    match (key_file, password) {
        (Some(key_file), _) => Some(AuthMethod::PublicKey {
            key_file: key_file.clone(),
            passphrase: passphrase.cloned(),
        }),
        (None, Some(password)) => Some(AuthMethod::Password(password.clone())),
        (None, None) => None,
    }
}
