use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A location the caller asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherQuery {
    City(String),
    Coords { lat: f64, lon: f64 },
}

impl WeatherQuery {
    pub fn coords(&self) -> Option<Coord> {
        match self {
            WeatherQuery::City(_) => None,
            WeatherQuery::Coords { lat, lon } => Some(Coord { lat: *lat, lon: *lon }),
        }
    }
}

impl fmt::Display for WeatherQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeatherQuery::City(city) => write!(f, "city {}", city),
            WeatherQuery::Coords { lat, lon } => write!(f, "coords {}, {}", lat, lon),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeather {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub coord: Option<Coord>,
    /// Shift in seconds from UTC.
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
    #[serde(default)]
    pub main: Option<MainReadings>,
    #[serde(default)]
    pub sys: Option<CurrentSys>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CurrentWeather {
    /// Headline condition such as `Rain` or `Clear`.
    pub fn condition(&self) -> Option<&str> {
        self.weather.first().map(|w| w.main.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSys {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub sea_level: Option<f64>,
    pub grnd_level: Option<f64>,
    pub temp_kf: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub cod: String,
    #[serde(default)]
    pub message: f64,
    #[serde(default)]
    pub cnt: i32,
    pub list: Vec<ForecastItem>,
    pub city: ForecastCity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastItem {
    pub dt: i64,
    pub main: MainReadings,
    pub weather: Vec<WeatherCondition>,
    pub clouds: Clouds,
    pub wind: Wind,
    pub visibility: Option<i32>,
    #[serde(default)]
    pub pop: f64,
    pub rain: Option<HashMap<String, f64>>,
    pub snow: Option<HashMap<String, f64>>,
    pub sys: Option<ForecastSys>,
    pub dt_txt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clouds {
    pub all: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    pub deg: f64,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSys {
    pub pod: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastCity {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub coord: Option<Coord>,
    #[serde(default)]
    pub country: String,
    pub population: Option<i64>,
    #[serde(default)]
    pub timezone: i32,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirPollutionResponse {
    pub coord: Option<Coord>,
    pub list: Vec<AirPollutionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirPollutionItem {
    pub dt: i64,
    pub main: AirPollutionMain,
    pub components: AirComponents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirPollutionMain {
    pub aqi: u8,
}

/// Pollutant concentrations in µg/m³.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirComponents {
    pub co: f64,
    pub no: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
    pub nh3: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvIndexResponse {
    pub lat: f64,
    pub lon: f64,
    pub date_iso: Option<String>,
    pub date: Option<i64>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResponse {
    pub name: String,
    pub local_names: Option<HashMap<String, String>>,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
    pub state: Option<String>,
}
