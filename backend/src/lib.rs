pub mod config;
pub mod error;
pub mod geocoding_handlers;
pub mod models;
pub mod nominatim;
pub mod osrm;
pub mod search_cache;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{
        header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        HeaderValue, Method, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::error::{api_error, ProxyError};
use crate::models::{ApiError, EtaRequest, EtaResponse, HealthResponse, RouteRequest, RouteResponse};
use crate::nominatim::NominatimClient;
use crate::osrm::OsrmClient;
use crate::search_cache::SearchCache;

#[derive(Clone)]
pub struct AppState {
    pub osrm: Arc<OsrmClient>,
    pub geocoder: Arc<NominatimClient>,
    pub search_cache: Arc<SearchCache>,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            osrm: Arc::new(OsrmClient::new(&config.osrm_url, &config.osrm_profile)?),
            geocoder: Arc::new(NominatimClient::new(
                &config.nominatim_url,
                config.nominatim_country_codes.clone(),
            )?),
            search_cache: Arc::new(SearchCache::new(
                config.search_cache_capacity,
                config.search_cache_ttl,
            )),
        })
    }
}

/// API routes only; see [`create_app`] for the served application.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/route", post(route_handler))
        .route("/api/eta", post(eta_handler))
        .route("/api/search", get(geocoding_handlers::search))
        .route("/api/reverse", get(geocoding_handlers::reverse))
        .with_state(state)
}

/// API routes plus static front-end files, CORS, security headers and
/// request tracing.
pub fn create_app(state: AppState, config: &ServerConfig) -> Router {
    let mut app = create_router(state);
    if let Some(dir) = &config.static_dir {
        tracing::info!("serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(SetResponseHeaderLayer::if_not_present(
        X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    ))
    .layer(cors_layer(config))
    .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(err)) => {
            tracing::warn!("ignoring invalid CORS_ORIGIN: {err}");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn route_handler(
    State(state): State<AppState>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, Json<ApiError>)> {
    if !req.start.is_valid() || !req.end.is_valid() {
        return Err(api_error(ProxyError::InvalidInput(
            "start and end must be valid coordinates".to_string(),
        )));
    }
    tracing::info!("Route request: {:?} -> {:?}", req.start, req.end);

    let route = state
        .osrm
        .route(req.start, req.end)
        .await
        .map_err(api_error)?;
    tracing::info!(
        "Found route with {} points, {:.0} m, {:.0} s",
        route.path.len(),
        route.distance_m,
        route.duration_s
    );

    Ok(Json(route))
}

async fn eta_handler(
    Json(req): Json<EtaRequest>,
) -> Result<Json<EtaResponse>, (StatusCode, Json<ApiError>)> {
    let eta = EtaResponse::from_distance(req.distance_m, req.speed_kmh).ok_or_else(|| {
        api_error(ProxyError::InvalidInput(
            "distance and speed must be positive numbers".to_string(),
        ))
    })?;
    tracing::debug!(
        "ETA for {} m at {} km/h: {:.1} s ({})",
        req.distance_m,
        req.speed_kmh,
        eta.seconds,
        eta.formatted
    );

    Ok(Json(eta))
}
