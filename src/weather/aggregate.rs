use super::air_quality::{self, uv_risk, AirQuality, AirQualityError};
use super::cache::{CacheKey, CacheStore};
use super::moon::{moon_phase_data, MoonError, MoonPhaseData};
use super::openweather::OpenWeatherError;
use super::types::*;
use crate::utils::format_unix_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Upstream data the aggregator pulls from.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_weather(
        &self,
        query: &WeatherQuery,
    ) -> Result<CurrentWeather, OpenWeatherError>;
    async fn forecast(&self, query: &WeatherQuery) -> Result<ForecastResponse, OpenWeatherError>;
    async fn air_pollution(&self, coord: Coord) -> Result<AirPollutionResponse, OpenWeatherError>;
    async fn uv_index(&self, coord: Coord) -> Result<UvIndexResponse, OpenWeatherError>;
}

/// Failures that abort an aggregation. The display text is shown to end users.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("City '{0}' not found. Please check the spelling and try again.")]
    NotFound(String),
    #[error("Could not fetch weather data. Please try again later.")]
    Upstream(#[source] OpenWeatherError),
    #[error("A network error occurred. Please check your connection.")]
    Network(#[source] OpenWeatherError),
    #[error("Could not fetch weather for your location. Please try searching manually.")]
    Location(#[source] OpenWeatherError),
}

impl AggregateError {
    fn from_upstream(query: &WeatherQuery, err: OpenWeatherError) -> Self {
        match query {
            WeatherQuery::Coords { .. } => AggregateError::Location(err),
            WeatherQuery::City(city) if err.is_not_found() => {
                AggregateError::NotFound(city.clone())
            }
            WeatherQuery::City(_) if err.is_network() => AggregateError::Network(err),
            WeatherQuery::City(_) => AggregateError::Upstream(err),
        }
    }
}

/// Why a secondary field came back empty.
#[derive(Error, Debug)]
pub enum PartialDataUnavailable {
    #[error("no coordinates for this location")]
    NoCoordinates,
    #[error(transparent)]
    Upstream(#[from] OpenWeatherError),
    #[error(transparent)]
    Moon(#[from] MoonError),
    #[error(transparent)]
    AirQuality(#[from] AirQualityError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub current: CurrentWeather,
    pub forecast: ForecastResponse,
    pub aqi: Option<AirQuality>,
    pub uvi: Option<f64>,
    pub uv_risk: Option<String>,
    pub moon: Option<MoonPhaseData>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

/// Wire shape handed to the presentation layer: either the report fields
/// with `error: null`, or only `error`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedWeather {
    #[serde(flatten)]
    pub report: Option<WeatherReport>,
    pub error: Option<String>,
}

impl From<Result<WeatherReport, AggregateError>> for AggregatedWeather {
    fn from(result: Result<WeatherReport, AggregateError>) -> Self {
        match result {
            Ok(report) => Self {
                report: Some(report),
                error: None,
            },
            Err(e) => Self {
                report: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub struct Aggregator {
    source: Arc<dyn WeatherSource>,
    cache: CacheStore,
}

impl Aggregator {
    pub fn new(source: Arc<dyn WeatherSource>, cache: CacheStore) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub async fn aggregate_response(&self, query: &WeatherQuery) -> AggregatedWeather {
        self.aggregate(query).await.into()
    }

    pub async fn aggregate(&self, query: &WeatherQuery) -> Result<WeatherReport, AggregateError> {
        let key = CacheKey::for_query(query);

        if let Some(key) = &key {
            if let Some(report) = self.cached(key).await {
                tracing::debug!("Serving {} from cache", query);
                return Ok(report);
            }
        }

        tracing::debug!("Fetching {} from upstream", query);

        let current = self
            .source
            .current_weather(query)
            .await
            .map_err(|e| abort(query, e))?;
        let forecast = self
            .source
            .forecast(query)
            .await
            .map_err(|e| abort(query, e))?;

        let report = self.assemble(query, current, forecast, Utc::now()).await;

        if let Some(key) = &key {
            match serde_json::to_value(&report) {
                Ok(payload) => self.cache.put(key, payload).await,
                Err(e) => tracing::warn!("Could not serialize report for {}: {}", query, e),
            }
        }

        Ok(report)
    }

    async fn cached(&self, key: &CacheKey) -> Option<WeatherReport> {
        let payload = self.cache.get(key).await?;
        match serde_json::from_value(payload) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::debug!("Cached payload for {} is not a report: {}", key.file_name(), e);
                None
            }
        }
    }

    async fn assemble(
        &self,
        query: &WeatherQuery,
        current: CurrentWeather,
        forecast: ForecastResponse,
        now: DateTime<Utc>,
    ) -> WeatherReport {
        let coord = current.coord.or_else(|| query.coords());
        let timezone_offset = current.timezone;

        let moon = best_effort(
            "moon phase",
            query,
            compute_moon(coord, local_date(now, timezone_offset), timezone_offset),
        );
        let uvi = best_effort("UV index", query, self.fetch_uv_index(coord).await);
        let aqi = best_effort("air quality", query, self.fetch_air_quality(coord).await);

        let sun_time = |pick: fn(&CurrentSys) -> Option<i64>| {
            current
                .sys
                .as_ref()
                .and_then(pick)
                .and_then(|ts| format_unix_timestamp(ts, timezone_offset))
        };
        let sunrise = sun_time(|sys| sys.sunrise);
        let sunset = sun_time(|sys| sys.sunset);

        WeatherReport {
            uv_risk: uvi.map(|value| uv_risk(value).to_string()),
            current,
            forecast,
            aqi,
            uvi,
            moon,
            sunrise,
            sunset,
        }
    }

    async fn fetch_uv_index(&self, coord: Option<Coord>) -> Result<f64, PartialDataUnavailable> {
        let coord = coord.ok_or(PartialDataUnavailable::NoCoordinates)?;
        Ok(self.source.uv_index(coord).await?.value)
    }

    async fn fetch_air_quality(
        &self,
        coord: Option<Coord>,
    ) -> Result<AirQuality, PartialDataUnavailable> {
        let coord = coord.ok_or(PartialDataUnavailable::NoCoordinates)?;
        let response = self.source.air_pollution(coord).await?;
        Ok(air_quality::classify(&response)?)
    }
}

fn abort(query: &WeatherQuery, err: OpenWeatherError) -> AggregateError {
    tracing::error!("Weather lookup for {} failed: {}", query, err);
    AggregateError::from_upstream(query, err)
}

fn compute_moon(
    coord: Option<Coord>,
    date: NaiveDate,
    timezone_offset: i32,
) -> Result<MoonPhaseData, PartialDataUnavailable> {
    let coord = coord.ok_or(PartialDataUnavailable::NoCoordinates)?;
    Ok(moon_phase_data(date, coord, timezone_offset)?)
}

/// Keep the value or log why it is missing.
fn best_effort<T, E: fmt::Display>(
    field: &str,
    query: &WeatherQuery,
    result: Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{} unavailable for {}: {}", field, query, e);
            None
        }
    }
}

/// Calendar date at the location.
fn local_date(now: DateTime<Utc>, timezone_offset: i32) -> NaiveDate {
    FixedOffset::east_opt(timezone_offset)
        .map(|offset| now.with_timezone(&offset).date_naive())
        .unwrap_or_else(|| now.date_naive())
}
