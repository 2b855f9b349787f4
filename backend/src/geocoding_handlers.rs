// Handlers for the geocoding proxy endpoints
// Search results are cached per normalised query; reverse lookups are not.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{api_error, ProxyError};
use crate::models::{ApiError, Coordinate, Location, SearchResponse};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ReverseParams {
    pub lat: f64,
    pub lon: f64,
}

/// GET /api/search?q= - Forward geocoding
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ApiError>)> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(api_error(ProxyError::InvalidInput(
            "query parameter q is required".to_string(),
        )));
    }
    tracing::info!("Search request: {query:?}");

    if let Some(locations) = state.search_cache.get(query) {
        return Ok(Json(SearchResponse { locations }));
    }

    let locations = state.geocoder.search(query).await.map_err(api_error)?;
    tracing::debug!("{} location(s) for {query:?}", locations.len());
    state.search_cache.insert(query, locations.clone());

    Ok(Json(SearchResponse { locations }))
}

/// GET /api/reverse?lat=&lon= - Reverse geocoding
pub async fn reverse(
    State(state): State<AppState>,
    Query(params): Query<ReverseParams>,
) -> Result<Json<Location>, (StatusCode, Json<ApiError>)> {
    let coord = Coordinate {
        lat: params.lat,
        lon: params.lon,
    };
    if !coord.is_valid() {
        return Err(api_error(ProxyError::InvalidInput(
            "lat and lon must be valid coordinates".to_string(),
        )));
    }

    state
        .geocoder
        .reverse(coord)
        .await
        .map(Json)
        .map_err(api_error)
}
