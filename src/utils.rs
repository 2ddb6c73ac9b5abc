use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// Validate latitude and longitude coordinates
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Invalid latitude: {}. Must be between -90 and 90", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Invalid longitude: {}. Must be between -180 and 180", lon));
    }
    Ok(())
}

pub fn is_valid_coordinates(lat: f64, lon: f64) -> bool {
    validate_coordinates(lat, lon).is_ok()
}

/// Round to specified decimal places
pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let multiplier = 10_f64.powi(decimals as i32);
    (value * multiplier).round() / multiplier
}

/// Keep only characters that are safe in a cache file name: alphanumerics,
/// spaces and underscores.
pub fn sanitize_city(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Render a UTC instant as `HH:MM AM/PM` at the given UTC offset (seconds).
pub fn format_local_time(utc_time: DateTime<Utc>, timezone_offset: i32) -> Option<String> {
    let offset = FixedOffset::east_opt(timezone_offset)?;
    Some(utc_time.with_timezone(&offset).format("%I:%M %p").to_string())
}

/// Same as [`format_local_time`] for a Unix timestamp.
pub fn format_unix_timestamp(ts: i64, timezone_offset: i32) -> Option<String> {
    let utc_time = DateTime::from_timestamp(ts, 0)?;
    format_local_time(utc_time, timezone_offset)
}

/// Error response helper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}
