use axum::{http::StatusCode, Json};
use thiserror::Error;

use crate::models::ApiError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("no route found between the selected points")]
    NoRoute,
    #[error("no place found for the given coordinates")]
    NotFound,
    #[error("geocoding service is initializing, please try again later")]
    GeocoderInitializing,
    #[error("{service} responded with HTTP {status}")]
    UpstreamStatus {
        service: &'static str,
        status: StatusCode,
    },
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("unexpected {service} payload: {detail}")]
    UpstreamPayload {
        service: &'static str,
        detail: String,
    },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::NoRoute | ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::GeocoderInitializing => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamStatus { .. }
            | ProxyError::Upstream(_)
            | ProxyError::UpstreamPayload { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convert ProxyError to API error response
pub fn api_error(err: ProxyError) -> (StatusCode, Json<ApiError>) {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!("upstream failure: {err}");
    }

    (
        status,
        Json(ApiError {
            initializing: matches!(err, ProxyError::GeocoderInitializing),
            message: err.to_string(),
        }),
    )
}
