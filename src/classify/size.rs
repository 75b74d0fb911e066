//! Size-text parsing and bitrate estimation

use regex::Regex;
use std::sync::LazyLock;

static SIZE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(GB|MB|KB|TB|ГБ|МБ|КБ|ТБ)").unwrap());

/// Parses a human-readable size ("1.5 GB", "700 МБ") into a byte count
///
/// Units are binary (1024-based); Cyrillic units are treated as their Latin
/// equivalents. The result is truncated. Text without a recognizable size
/// yields 0.
pub fn parse_size_to_bytes(size_text: &str) -> i64 {
    let Some(caps) = SIZE_PATTERN.captures(size_text) else {
        return 0;
    };

    let Ok(value) = caps[1].parse::<f64>() else {
        return 0;
    };

    let exponent = match caps[2].to_uppercase().as_str() {
        "KB" | "КБ" => 1,
        "MB" | "МБ" => 2,
        "GB" | "ГБ" => 3,
        "TB" | "ТБ" => 4,
        _ => return 0,
    };

    (value * 1024f64.powi(exponent)) as i64
}

/// Average bitrate in Mbit/s, rounded to two decimals
///
/// Returns `None` unless both the size and the runtime are positive.
pub fn calculate_bitrate(size_bytes: i64, runtime_minutes: Option<i64>) -> Option<f64> {
    let runtime = runtime_minutes?;
    if size_bytes <= 0 || runtime <= 0 {
        return None;
    }

    let bits_per_second = (size_bytes as f64 * 8.0) / (runtime as f64 * 60.0);
    Some((bits_per_second / 1_000_000.0 * 100.0).round() / 100.0)
}
