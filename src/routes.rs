use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    config::Config,
    utils::ErrorResponse,
    weather::{
        aggregate::{AggregatedWeather, Aggregator},
        openweather::OpenWeatherClient,
        types::{GeocodeResponse, WeatherQuery},
    },
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Arc<Aggregator>,
    pub weather_client: Arc<OpenWeatherClient>,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoordsQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<CityQuery>,
) -> Json<AggregatedWeather> {
    let city = params
        .city
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.config.default_city.clone());

    let query = WeatherQuery::City(city);
    Json(state.aggregator.aggregate_response(&query).await)
}

pub async fn get_weather_by_coords(
    State(state): State<AppState>,
    Query(params): Query<CoordsQuery>,
) -> Json<AggregatedWeather> {
    let query = WeatherQuery::Coords {
        lat: params.lat,
        lon: params.lon,
    };
    Json(state.aggregator.aggregate_response(&query).await)
}

pub async fn geocode(
    State(state): State<AppState>,
    Query(params): Query<GeocodeQuery>,
) -> Result<Json<Vec<GeocodeResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let limit = params.limit.unwrap_or(5).clamp(1, 10);

    let Some(query) = params.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Query parameter 'q' is required", "missing_query")),
        ));
    };

    match state.weather_client.geocode_city(&query, limit).await {
        Ok(results) => Ok(Json(results)),
        Err(e) => {
            tracing::error!("Geocoding '{}' failed: {}", query, e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new("Geocoding service unavailable", "upstream_error")),
            ))
        }
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/weather", get(get_weather))
        .route("/weather-by-coords", get(get_weather_by_coords))
        .route("/geocode", get(geocode))
        .with_state(state)
}
