/// Format a computed number for display.
///
/// Uses the shortest decimal that round-trips (`7`, `3.5`, `0.1`). Callers
/// must check finiteness first; negative zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Interpret a display value as a number.
///
/// Only the whole trimmed text counts, and only finite values: `"inf"` and
/// `"NaN"` are text.
pub fn parse_number(display: &str) -> Option<f64> {
    let trimmed = display.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
