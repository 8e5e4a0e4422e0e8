//! Cell formatting shared by the writers.

use tvx_model::Value;

/// Formats a floating-point number without trailing zeros.
///
/// # Examples
///
/// ```
/// use tvx_output::format_numeric;
///
/// assert_eq!(format_numeric(1.0), "1");
/// assert_eq!(format_numeric(1.50), "1.5");
/// assert_eq!(format_numeric(0.0), "0");
/// ```
pub fn format_numeric(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// Text of one cell: empty for missing, `1&2` for concurrent codes.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Float(v) => format_numeric(*v),
        other => other.to_string(),
    }
}
