use serde::Serialize;

use crate::Coordinate;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouteError {
    #[error("a route needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("route duration must be finite and non-negative, got {0}")]
    InvalidDuration(f64),
}

/// Path geometry plus the travel time the vehicle needs to cover it.
///
/// A `Route` is never mutated after construction; a new calculation replaces it
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    points: Vec<Coordinate>,
    duration_seconds: f64,
}

impl Route {
    pub fn new(points: Vec<Coordinate>, duration_seconds: f64) -> Result<Self, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooFewPoints(points.len()));
        }
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(RouteError::InvalidDuration(duration_seconds));
        }
        Ok(Self {
            points,
            duration_seconds,
        })
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn start(&self) -> Coordinate {
        self.points[0]
    }

    pub fn end(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }
}
