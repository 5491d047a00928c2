//! Name sanitizing and value formatting for the text exposition format.

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;
    let mut chars = name.chars().peekable();

    // Handle first character specially - must be letter or underscore
    // If it's a digit, prefix with underscore and keep the digit
    if let Some(&first) = chars.peek()
        && first.is_ascii_digit() {
            result.push('_');
            last_was_underscore = true;
        }

    for c in chars {
        // After first char handling, all alphanumeric, underscore, and colon are valid
        let is_valid_char = c.is_ascii_alphanumeric() || c == '_' || c == ':';

        if is_valid_char {
            // For underscores, only add if last char wasn't an underscore (collapse)
            if c == '_' {
                if !last_was_underscore {
                    result.push(c);
                    last_was_underscore = true;
                }
            } else {
                result.push(c);
                last_was_underscore = false;
            }
        } else if !last_was_underscore {
            // Replace invalid char with underscore (but don't add consecutive)
            result.push('_');
            last_was_underscore = true;
        }
    }

    // Remove trailing underscores
    while result.ends_with('_') {
        result.pop();
    }

    // Handle empty result
    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Sanitize a label name to be Prometheus-compatible.
///
/// Prometheus label names must match `[a-zA-Z_][a-zA-Z0-9_]*`.
/// Labels starting with `__` are reserved for internal use.
pub fn sanitize_label_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for (i, c) in name.chars().enumerate() {
        let valid = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };

        if valid {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    // Remove trailing underscores
    while result.ends_with('_') {
        result.pop();
    }

    // Handle empty or reserved labels
    if result.is_empty() {
        return "label".to_string();
    }

    // Prefix with underscore if starts with double underscore (reserved)
    if result.starts_with("__") {
        result.insert(0, 'z');
    }

    result
}

/// Build a full metric name from the exporter prefix and a sample name.
///
/// Format: `{prefix}_{name}`
pub fn build_metric_name(prefix: &str, name: &str) -> String {
    let sanitized = sanitize_metric_name(name);

    if prefix.is_empty() {
        sanitized
    } else {
        format!("{}_{}", sanitize_metric_name(prefix), sanitized)
    }
}

/// Escape special characters in label values.
pub fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for the exposition format.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_metric_name_simple() {
        assert_eq!(sanitize_metric_name("cpu_usage"), "cpu_usage");
        assert_eq!(sanitize_metric_name("memory_total"), "memory_total");
    }

    #[test]
    fn test_sanitize_metric_name_slashes() {
        assert_eq!(sanitize_metric_name("system/sysUpTime"), "system_sysUpTime");
        assert_eq!(sanitize_metric_name("if/1/ifInOctets"), "if_1_ifInOctets");
    }

    #[test]
    fn test_sanitize_metric_name_special_chars() {
        assert_eq!(sanitize_metric_name("cpu.usage%"), "cpu_usage");
        assert_eq!(sanitize_metric_name("memory-used"), "memory_used");
        assert_eq!(sanitize_metric_name("disk[sda]"), "disk_sda");
    }

    #[test]
    fn test_sanitize_metric_name_collapse_underscores() {
        assert_eq!(sanitize_metric_name("cpu___usage"), "cpu_usage");
        assert_eq!(sanitize_metric_name("a//b//c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_metric_name_leading_number() {
        assert_eq!(sanitize_metric_name("1cpu"), "_1cpu");
    }

    #[test]
    fn test_sanitize_metric_name_empty() {
        assert_eq!(sanitize_metric_name(""), "unnamed");
        assert_eq!(sanitize_metric_name("///"), "unnamed");
    }

    #[test]
    fn test_sanitize_metric_name_colons() {
        // Colons are allowed in Prometheus metric names
        assert_eq!(sanitize_metric_name("foo:bar:baz"), "foo:bar:baz");
    }

    #[test]
    fn test_sanitize_label_name() {
        assert_eq!(sanitize_label_name("source"), "source");
        assert_eq!(sanitize_label_name("device-id"), "device_id");
        assert_eq!(sanitize_label_name("interface.name"), "interface_name");
    }

    #[test]
    fn test_sanitize_label_name_reserved() {
        // Labels starting with __ are reserved
        assert_eq!(sanitize_label_name("__meta"), "z__meta");
    }

    #[test]
    fn test_build_metric_name() {
        assert_eq!(build_metric_name("junos", "up"), "junos_up");
        assert_eq!(
            build_metric_name("junos", "interface/receive-bytes"),
            "junos_interface_receive_bytes"
        );
        assert_eq!(build_metric_name("", "alarms_total"), "alarms_total");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("plain"), "plain");
        assert_eq!(escape_label_value("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1");
        assert_eq!(format_value(0.25), "0.25");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
