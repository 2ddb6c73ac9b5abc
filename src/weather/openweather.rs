use super::aggregate::WeatherSource;
use super::types::*;
use crate::config::Config;
use crate::utils::is_valid_coordinates;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenWeatherError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Location not found")]
    NotFound,
    #[error("API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("Invalid coordinates")]
    InvalidCoordinates,
}

impl OpenWeatherError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OpenWeatherError::NotFound)
    }

    /// True for failures that never produced an HTTP status.
    pub fn is_network(&self) -> bool {
        matches!(self, OpenWeatherError::RequestFailed(_))
    }
}

pub struct OpenWeatherClient {
    client: Client,
    config: Config,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, OpenWeatherError> {
        let client = Client::builder()
            .user_agent("WeatherAggregator/1.0")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn get_current_weather(
        &self,
        city: &str,
    ) -> Result<CurrentWeather, OpenWeatherError> {
        let q = self.city_param(city);
        self.get(&self.config.openweather_weather_path, &[
            ("q", q.as_str()),
            ("units", "metric"),
        ])
        .await
    }

    pub async fn get_forecast(&self, city: &str) -> Result<ForecastResponse, OpenWeatherError> {
        let q = self.city_param(city);
        self.get(&self.config.openweather_forecast_path, &[
            ("q", q.as_str()),
            ("units", "metric"),
        ])
        .await
    }

    pub async fn get_weather_by_coords(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<CurrentWeather, OpenWeatherError> {
        ensure_valid_coordinates(lat, lon)?;

        self.get(&self.config.openweather_weather_path, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("units", "metric"),
        ])
        .await
    }

    pub async fn get_forecast_by_coords(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<ForecastResponse, OpenWeatherError> {
        ensure_valid_coordinates(lat, lon)?;

        self.get(&self.config.openweather_forecast_path, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
            ("units", "metric"),
        ])
        .await
    }

    pub async fn get_air_pollution(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<AirPollutionResponse, OpenWeatherError> {
        ensure_valid_coordinates(lat, lon)?;

        self.get(&self.config.openweather_air_pollution_path, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
        ])
        .await
    }

    pub async fn get_uv_index(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<UvIndexResponse, OpenWeatherError> {
        ensure_valid_coordinates(lat, lon)?;

        self.get(&self.config.openweather_uvi_path, &[
            ("lat", &lat.to_string()),
            ("lon", &lon.to_string()),
        ])
        .await
    }

    pub async fn geocode_city(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<GeocodeResponse>, OpenWeatherError> {
        self.get(&self.config.openweather_geocode_direct_path, &[
            ("q", query),
            ("limit", &limit.to_string()),
        ])
        .await
    }

    fn city_param(&self, city: &str) -> String {
        match &self.config.openweather_country_code {
            Some(code) => format!("{},{}", city, code),
            None => city.to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, OpenWeatherError> {
        let url = format!("{}{}", self.config.openweather_base_url, path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("appid", self.config.openweather_api_key.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.text().await?;
                Ok(serde_json::from_str(&body)?)
            }
            StatusCode::NOT_FOUND => Err(OpenWeatherError::NotFound),
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!("OpenWeather {} returned {}: {}", path, status, body);
                Err(OpenWeatherError::ApiError {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn ensure_valid_coordinates(lat: f64, lon: f64) -> Result<(), OpenWeatherError> {
    if is_valid_coordinates(lat, lon) {
        Ok(())
    } else {
        Err(OpenWeatherError::InvalidCoordinates)
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current_weather(
        &self,
        query: &WeatherQuery,
    ) -> Result<CurrentWeather, OpenWeatherError> {
        match query {
            WeatherQuery::City(city) => self.get_current_weather(city).await,
            WeatherQuery::Coords { lat, lon } => self.get_weather_by_coords(*lat, *lon).await,
        }
    }

    async fn forecast(&self, query: &WeatherQuery) -> Result<ForecastResponse, OpenWeatherError> {
        match query {
            WeatherQuery::City(city) => self.get_forecast(city).await,
            WeatherQuery::Coords { lat, lon } => self.get_forecast_by_coords(*lat, *lon).await,
        }
    }

    async fn air_pollution(&self, coord: Coord) -> Result<AirPollutionResponse, OpenWeatherError> {
        self.get_air_pollution(coord.lat, coord.lon).await
    }

    async fn uv_index(&self, coord: Coord) -> Result<UvIndexResponse, OpenWeatherError> {
        self.get_uv_index(coord.lat, coord.lon).await
    }
}
