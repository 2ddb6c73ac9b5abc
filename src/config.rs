use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub openweather_weather_path: String,
    pub openweather_forecast_path: String,
    pub openweather_air_pollution_path: String,
    pub openweather_uvi_path: String,
    pub openweather_geocode_direct_path: String,
    /// ISO 3166 country code appended to city lookups, e.g. `BD`.
    pub openweather_country_code: Option<String>,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub cache_memory_capacity: u64,
    pub default_city: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            openweather_api_key: env::var("OPENWEATHER_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENWEATHER_API_KEY not set"))?,
            openweather_base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openweathermap.org".to_string()),
            openweather_weather_path: env::var("OPENWEATHER_WEATHER_PATH")
                .unwrap_or_else(|_| "/data/2.5/weather".to_string()),
            openweather_forecast_path: env::var("OPENWEATHER_FORECAST_PATH")
                .unwrap_or_else(|_| "/data/2.5/forecast".to_string()),
            openweather_air_pollution_path: env::var("OPENWEATHER_AIR_POLLUTION_PATH")
                .unwrap_or_else(|_| "/data/2.5/air_pollution".to_string()),
            openweather_uvi_path: env::var("OPENWEATHER_UVI_PATH")
                .unwrap_or_else(|_| "/data/2.5/uvi".to_string()),
            openweather_geocode_direct_path: env::var("OPENWEATHER_GEOCODE_DIRECT_PATH")
                .unwrap_or_else(|_| "/geo/1.0/direct".to_string()),
            openweather_country_code: env::var("OPENWEATHER_COUNTRY_CODE")
                .ok()
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty()),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            cache_ttl_secs: parse_var("CACHE_TTL_SECS", 600)?,
            cache_memory_capacity: parse_var("CACHE_MEMORY_CAPACITY", 1000)?,
            default_city: env::var("DEFAULT_CITY").unwrap_or_else(|_| "Dhaka".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    /// Configuration pointing every OpenWeather path at `base_url`, used by tests.
    #[cfg(test)]
    pub fn for_base_url(base_url: &str) -> Self {
        Config {
            openweather_api_key: "test-key".to_string(),
            openweather_base_url: base_url.to_string(),
            openweather_weather_path: "/data/2.5/weather".to_string(),
            openweather_forecast_path: "/data/2.5/forecast".to_string(),
            openweather_air_pollution_path: "/data/2.5/air_pollution".to_string(),
            openweather_uvi_path: "/data/2.5/uvi".to_string(),
            openweather_geocode_direct_path: "/geo/1.0/direct".to_string(),
            openweather_country_code: None,
            cache_dir: PathBuf::from("cache"),
            cache_ttl_secs: 600,
            cache_memory_capacity: 1000,
            default_city: "Dhaka".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        Err(_) => Ok(default),
    }
}
