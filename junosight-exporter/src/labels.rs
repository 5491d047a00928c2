//! Dynamic interface labels discovered from free-text descriptions.
//!
//! Operators tag interfaces with markers such as `[peer=coreA]` or `[backup]`
//! in their descriptions. Every distinct tag name becomes an extra label on
//! interface metrics. Names are assigned a permanent column the first time
//! they are seen; the schema only ever grows.

use std::collections::HashMap;

use junosight_common::Label;
use parking_lot::Mutex;
use regex::Regex;

/// Matches `[name]` and `[name=value]`.
pub const DEFAULT_DESCRIPTION_PATTERN: &str = r"\[([^=\]]+)(?:=([^\]]+))?\]";

/// Value recorded for a tag without `=value`.
const PRESENCE_VALUE: &str = "1";

/// One tag found in an interface description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// Label names in discovery order. Position is the column index.
    names: Vec<String>,
    index: HashMap<String, usize>,
    interfaces: HashMap<(String, String), Vec<LabelRecord>>,
}

/// Process-wide label schema plus the tags of every interface seen so far.
///
/// Shared by all device tasks. One lock guards both the schema and the
/// per-interface store; it is never held across I/O.
#[derive(Debug)]
pub struct DynamicLabelRegistry {
    pattern: Regex,
    inner: Mutex<Inner>,
}

impl DynamicLabelRegistry {
    /// Create a registry using `pattern`. Group 1 is the tag name, the
    /// optional group 2 its value.
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Compile `pattern` and create a registry.
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(Regex::new(pattern)?))
    }

    /// Scan `description` and record its tags for `(host, interface)`.
    ///
    /// Names are lower-cased; names that are not identifiers are dropped.
    /// New names are appended to the schema. The interface's previous tags
    /// are replaced.
    pub fn parse_description(
        &self,
        host: &str,
        interface: &str,
        description: &str,
    ) -> Vec<LabelRecord> {
        let mut records: Vec<LabelRecord> = Vec::new();

        for caps in self.pattern.captures_iter(description) {
            let Some(name) = caps.get(1) else {
                continue;
            };
            let name = name.as_str().trim().to_lowercase();
            if !is_label_name(&name) || records.iter().any(|r| r.name == name) {
                continue;
            }

            let value = caps
                .get(2)
                .map(|v| v.as_str().to_string())
                .unwrap_or_else(|| PRESENCE_VALUE.to_string());
            records.push(LabelRecord { name, value });
        }

        let mut inner = self.inner.lock();
        for record in &records {
            if !inner.index.contains_key(&record.name) {
                let next = inner.names.len();
                inner.names.push(record.name.clone());
                inner.index.insert(record.name.clone(), next);
            }
        }
        inner
            .interfaces
            .insert((host.to_string(), interface.to_string()), records.clone());

        records
    }

    /// Current schema, in discovery order.
    pub fn label_names(&self) -> Vec<String> {
        self.inner.lock().names.clone()
    }

    /// Values for `(host, interface)` aligned with the current schema.
    ///
    /// Always as long as [`label_names`](Self::label_names) at the time of the
    /// call. Tags the interface does not carry are empty strings.
    pub fn values_for_interface(&self, host: &str, interface: &str) -> Vec<String> {
        let inner = self.inner.lock();
        values_locked(&inner, host, interface)
    }

    /// `(name, value)` pairs for `(host, interface)`.
    ///
    /// Names and values come from the same snapshot, so the pair count always
    /// matches the names attached to a sample.
    pub fn labels_for_interface(&self, host: &str, interface: &str) -> Vec<Label> {
        let inner = self.inner.lock();
        let values = values_locked(&inner, host, interface);
        inner.names.iter().cloned().zip(values).collect()
    }
}

fn values_locked(inner: &Inner, host: &str, interface: &str) -> Vec<String> {
    let mut values = vec![String::new(); inner.names.len()];

    if let Some(records) = inner
        .interfaces
        .get(&(host.to_string(), interface.to_string()))
    {
        for record in records {
            if let Some(&idx) = inner.index.get(&record.name) {
                values[idx] = record.value.clone();
            }
        }
    }

    values
}

/// `[a-z][a-z0-9_]*`
fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
