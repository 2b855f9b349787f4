pub use shared::{
    ApiError, Coordinate, EtaRequest, EtaResponse, HealthResponse, Location, Route, RouteLeg,
    RouteRequest, RouteResponse, RouteStep, SearchResponse,
};
