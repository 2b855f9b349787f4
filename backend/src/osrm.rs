//! Client for an OSRM-compatible routing service.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::ProxyError,
    models::{Coordinate, RouteLeg, RouteResponse, RouteStep},
};

const SERVICE: &str = "osrm";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

#[derive(Clone)]
pub struct OsrmClient {
    http: Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    pub fn new(base_url: impl Into<String>, profile: impl Into<String>) -> Result<Self, ProxyError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            profile: profile.into(),
        })
    }

    /// Fetches the best driving route with full GeoJSON geometry and turn steps.
    pub async fn route(&self, start: Coordinate, end: Coordinate) -> Result<RouteResponse, ProxyError> {
        let url = format!(
            "{}/route/v1/{}/{};{}",
            self.base_url,
            self.profile,
            lon_lat(start),
            lon_lat(end)
        );
        tracing::debug!("OSRM request {url}");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("steps", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: OsrmRouteResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(ProxyError::UpstreamStatus {
                    service: SERVICE,
                    status,
                });
            }
            Err(err) => {
                return Err(ProxyError::UpstreamPayload {
                    service: SERVICE,
                    detail: err.to_string(),
                });
            }
        };

        into_route_response(body)
    }
}

fn lon_lat(coord: Coordinate) -> String {
    format!("{},{}", coord.lon, coord.lat)
}

fn into_route_response(body: OsrmRouteResponse) -> Result<RouteResponse, ProxyError> {
    if body.code != "Ok" {
        let code = body.code;
        let message = body.message.unwrap_or_else(|| code.clone());
        tracing::info!("OSRM returned {code}: {message}");
        return match code.as_str() {
            "NoRoute" | "NoSegment" => Err(ProxyError::NoRoute),
            "InvalidQuery" | "InvalidValue" | "InvalidOptions" => {
                Err(ProxyError::InvalidInput(message))
            }
            _ => Err(ProxyError::UpstreamPayload {
                service: SERVICE,
                detail: format!("{code}: {message}"),
            }),
        };
    }

    let Some(route) = body.routes.into_iter().next() else {
        return Err(ProxyError::NoRoute);
    };

    let path: Vec<Coordinate> = route
        .geometry
        .coordinates
        .into_iter()
        .map(Coordinate::from_lon_lat)
        .collect();
    if path.len() < 2 {
        return Err(ProxyError::NoRoute);
    }

    Ok(RouteResponse {
        path,
        distance_m: route.distance,
        duration_s: route.duration,
        legs: route.legs.into_iter().map(into_leg).collect(),
    })
}

fn into_leg(leg: OsrmLeg) -> RouteLeg {
    RouteLeg {
        distance_m: leg.distance,
        duration_s: leg.duration,
        summary: leg.summary,
        steps: leg
            .steps
            .into_iter()
            .map(|step| RouteStep {
                distance_m: step.distance,
                duration_s: step.duration,
                name: step.name,
                maneuver: step.maneuver.kind,
                modifier: step.maneuver.modifier,
            })
            .collect(),
    }
}
