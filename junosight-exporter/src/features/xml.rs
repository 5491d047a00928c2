//! Helpers for decoding structured command replies.

use serde::de::DeserializeOwned;

use crate::feature::FeatureError;

/// Decode an XML reply into `T`.
///
/// An empty reply means the device has nothing to say for this command and
/// decodes to [`FeatureError::NoMoreData`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FeatureError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FeatureError::Parse(format!("reply is not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() {
        return Err(FeatureError::NoMoreData);
    }

    quick_xml::de::from_str(text).map_err(|e| FeatureError::Parse(e.to_string()))
}

/// Parse a numeric element value, tolerating surrounding whitespace.
pub fn number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Trimmed element text, or `""`.
pub fn text(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or_default()
}
