/// Parse a backend decimal string (`"45.123"`) into seconds.
///
/// Empty, malformed, non-finite and negative inputs are "no time", never 0.
pub fn parse_seconds(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        _ => None,
    }
}

/// `45.123 s`
pub fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format!("{s:.3} s"),
        None => "—".to_string(),
    }
}

/// `00:45.123`, minutes are not wrapped into hours.
pub fn format_clock(seconds: Option<f64>) -> String {
    let Some(s) = seconds else {
        return "--:--.---".to_string();
    };
    let millis = (s * 1000.0).round() as u64;
    let minutes = millis / 60_000;
    let rest = millis % 60_000;
    format!("{minutes:02}:{:02}.{:03}", rest / 1000, rest % 1000)
}
