use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod eta;
pub mod playback;
pub mod route;

pub use eta::{EtaRequest, EtaResponse};
pub use route::{Route, RouteError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Linear interpolation in coordinate space. `t == 0` and `t == 1` return
    /// the endpoints bit-for-bit.
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        if t >= 1.0 {
            return other;
        }
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    /// Builds a coordinate from a GeoJSON position, which is `[lon, lat]`.
    pub fn from_lon_lat(position: [f64; 2]) -> Self {
        Self {
            lat: position[1],
            lon: position[0],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub start: Coordinate,
    pub end: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub name: String,
    pub maneuver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

/// Route as returned by `/api/route`. `duration_s` is the routing engine's own
/// estimate; playback uses the speed-based ETA from `/api/eta` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub path: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BTreeMap<String, String>>,
}

impl Location {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    /// Set when the geocoder is still importing its data and should be retried.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initializing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_hits_endpoints_exactly() {
        let a = Coordinate { lat: 0.1, lon: 23.8 };
        let b = Coordinate { lat: 0.3, lon: 90.4 };
        assert_eq!(a.interpolate(b, 0.0), a);
        assert_eq!(a.interpolate(b, 1.0), b);
    }

    #[test]
    fn geojson_positions_are_lon_lat() {
        let coord = Coordinate::from_lon_lat([90.4125, 23.8103]);
        assert_eq!(coord.lat, 23.8103);
        assert_eq!(coord.lon, 90.4125);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinate { lat: 23.8, lon: 90.4 }.is_valid());
        assert!(!Coordinate { lat: 91.0, lon: 0.0 }.is_valid());
        assert!(!Coordinate { lat: 0.0, lon: f64::NAN }.is_valid());
    }

    #[test]
    fn api_error_omits_initializing_flag_when_false() {
        let err = ApiError {
            message: "boom".into(),
            initializing: false,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);

        let parsed: ApiError = serde_json::from_str(r#"{"message":"wait","initializing":true}"#).unwrap();
        assert!(parsed.initializing);
    }
}
