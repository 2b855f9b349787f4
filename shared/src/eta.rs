//! Travel-time estimate from route distance and a chosen vehicle speed.

use serde::{Deserialize, Serialize};

const KMH_PER_MPS: f64 = 3.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EtaRequest {
    pub distance_m: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaResponse {
    pub seconds: f64,
    pub minutes: u64,
    pub formatted: String,
}

impl EtaResponse {
    /// `None` when distance or speed is not a finite, strictly positive number.
    pub fn from_distance(distance_m: f64, speed_kmh: f64) -> Option<Self> {
        let seconds = travel_time_seconds(distance_m, speed_kmh)?;
        Some(Self {
            seconds,
            minutes: (seconds / 60.0).round() as u64,
            formatted: format_eta(seconds),
        })
    }
}

/// `distance / (speed / 3.6)`, speed in km/h, result in seconds.
pub fn travel_time_seconds(distance_m: f64, speed_kmh: f64) -> Option<f64> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(distance_m) || !positive(speed_kmh) {
        return None;
    }
    Some(distance_m / (speed_kmh / KMH_PER_MPS))
}

/// Formats a duration as `"1h 0m 5s"`, `"2m 3s"` or `"42s"`.
///
/// The total is rounded to whole seconds before being split, so the seconds
/// part never reads `60s`. Minutes are shown whenever hours are.
pub fn format_eta(total_seconds: f64) -> String {
    let total = whole_seconds(total_seconds);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut formatted = String::new();
    if hours > 0 {
        formatted.push_str(&format!("{hours}h "));
    }
    if hours > 0 || minutes > 0 {
        formatted.push_str(&format!("{minutes}m "));
    }
    formatted.push_str(&format!("{seconds}s"));
    formatted
}

/// Elapsed playback time as `m:ss`.
pub fn format_clock(elapsed_seconds: u64) -> String {
    format!("{}:{:02}", elapsed_seconds / 60, elapsed_seconds % 60)
}

fn whole_seconds(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
