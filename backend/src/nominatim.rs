//! Client for a Nominatim-compatible geocoding service.

use std::{collections::BTreeMap, time::Duration};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    error::ProxyError,
    models::{Coordinate, Location},
};

const SERVICE: &str = "nominatim";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);
const REVERSE_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReverseResponse {
    Place(NominatimPlace),
    Error { error: String },
}

impl NominatimPlace {
    /// `None` when the coordinates cannot be parsed.
    fn into_location(self) -> Option<Location> {
        let lat = self.lat.trim().parse().ok()?;
        let lon = self.lon.trim().parse().ok()?;
        let address = self.address.map(|fields| {
            fields
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::String(text) => Some((key, text)),
                    _ => None,
                })
                .collect()
        });
        Some(Location {
            lat,
            lon,
            display_name: self.display_name,
            address,
        })
    }
}

#[derive(Clone)]
pub struct NominatimClient {
    http: Client,
    base_url: String,
    country_codes: Option<String>,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>, country_codes: Option<String>) -> Result<Self, ProxyError> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: base_url.into(),
            country_codes,
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Location>, ProxyError> {
        let mut params = vec![
            ("q", query),
            ("format", "json"),
            ("limit", SEARCH_LIMIT),
            ("addressdetails", "1"),
        ];
        if let Some(codes) = &self.country_codes {
            params.push(("countrycodes", codes.as_str()));
        }

        let request = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&params)
            .timeout(SEARCH_TIMEOUT);
        let places: Vec<NominatimPlace> = fetch_json(request).await?;

        let total = places.len();
        let locations: Vec<Location> = places
            .into_iter()
            .filter_map(NominatimPlace::into_location)
            .collect();
        if locations.len() < total {
            tracing::warn!(
                "skipped {} search result(s) with unparsable coordinates",
                total - locations.len()
            );
        }
        Ok(locations)
    }

    pub async fn reverse(&self, coord: Coordinate) -> Result<Location, ProxyError> {
        let lat = coord.lat.to_string();
        let lon = coord.lon.to_string();
        let request = self
            .http
            .get(format!("{}/reverse", self.base_url))
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str()), ("format", "json")])
            .timeout(REVERSE_TIMEOUT);

        match fetch_json(request).await? {
            ReverseResponse::Place(place) => {
                place.into_location().ok_or_else(|| ProxyError::UpstreamPayload {
                    service: SERVICE,
                    detail: "reverse result without coordinates".to_string(),
                })
            }
            ReverseResponse::Error { error } => {
                tracing::debug!("reverse geocoding returned: {error}");
                Err(ProxyError::NotFound)
            }
        }
    }
}

async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProxyError> {
    let response = request.send().await.map_err(|err| {
        if err.is_connect() {
            tracing::warn!("geocoder unreachable: {err}");
            ProxyError::GeocoderInitializing
        } else {
            ProxyError::Upstream(err)
        }
    })?;
    let response = check_status(response)?;
    response
        .json::<T>()
        .await
        .map_err(|err| ProxyError::UpstreamPayload {
            service: SERVICE,
            detail: err.to_string(),
        })
}

fn check_status(response: Response) -> Result<Response, ProxyError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::SERVICE_UNAVAILABLE => Err(ProxyError::GeocoderInitializing),
        status => Err(ProxyError::UpstreamStatus {
            service: SERVICE,
            status,
        }),
    }
}
