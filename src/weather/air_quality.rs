use super::types::{AirComponents, AirPollutionResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AirQualityError {
    #[error("Air pollution response has no readings")]
    NoReadings,
    #[error("AQI {0} is outside the 1-5 scale")]
    AqiOutOfRange(u8),
}

/// OpenWeather's 1-5 air quality index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AqiLevel {
    Good,
    Fair,
    Moderate,
    Poor,
    VeryPoor,
}

impl AqiLevel {
    pub fn from_index(aqi: u8) -> Option<Self> {
        match aqi {
            1 => Some(AqiLevel::Good),
            2 => Some(AqiLevel::Fair),
            3 => Some(AqiLevel::Moderate),
            4 => Some(AqiLevel::Poor),
            5 => Some(AqiLevel::VeryPoor),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiLevel::Good => "Good",
            AqiLevel::Fair => "Fair",
            AqiLevel::Moderate => "Moderate",
            AqiLevel::Poor => "Poor",
            AqiLevel::VeryPoor => "Very Poor",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            AqiLevel::Good => "good",
            AqiLevel::Fair => "fair",
            AqiLevel::Moderate => "moderate",
            AqiLevel::Poor => "poor",
            AqiLevel::VeryPoor => "very-poor",
        }
    }
}

/// US EPA PM2.5 bands (µg/m³, 24h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pm25Level {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

const PM25_BREAKPOINTS: [(f64, Pm25Level); 5] = [
    (12.0, Pm25Level::Good),
    (35.4, Pm25Level::Moderate),
    (55.4, Pm25Level::UnhealthyForSensitive),
    (150.4, Pm25Level::Unhealthy),
    (250.4, Pm25Level::VeryUnhealthy),
];

impl Pm25Level {
    /// Upper bounds are inclusive.
    pub fn from_concentration(pm2_5: f64) -> Self {
        PM25_BREAKPOINTS
            .iter()
            .find(|(upper, _)| pm2_5 <= *upper)
            .map(|(_, level)| *level)
            .unwrap_or(Pm25Level::Hazardous)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pm25Level::Good => "Good",
            Pm25Level::Moderate => "Moderate",
            Pm25Level::UnhealthyForSensitive => "Unhealthy for Sensitive",
            Pm25Level::Unhealthy => "Unhealthy",
            Pm25Level::VeryUnhealthy => "Very Unhealthy",
            Pm25Level::Hazardous => "Hazardous",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Pm25Level::Good => "good",
            Pm25Level::Moderate => "moderate",
            Pm25Level::UnhealthyForSensitive => "unhealthy-for-sensitive",
            Pm25Level::Unhealthy => "unhealthy",
            Pm25Level::VeryUnhealthy => "very-unhealthy",
            Pm25Level::Hazardous => "hazardous",
        }
    }
}

/// WHO UV index risk label.
pub fn uv_risk(uvi: f64) -> &'static str {
    if uvi < 3.0 {
        "Low"
    } else if uvi < 6.0 {
        "Moderate"
    } else if uvi < 8.0 {
        "High"
    } else if uvi < 11.0 {
        "Very High"
    } else {
        "Extreme"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub aqi: u8,
    pub level: String,
    pub category: String,
    pub pm2_5: f64,
    pub pm2_5_level: String,
    pub pm2_5_category: String,
    pub components: AirComponents,
}

/// Classify the first reading of an air pollution response.
pub fn classify(response: &AirPollutionResponse) -> Result<AirQuality, AirQualityError> {
    let reading = response.list.first().ok_or(AirQualityError::NoReadings)?;
    let aqi = reading.main.aqi;
    let level = AqiLevel::from_index(aqi).ok_or(AirQualityError::AqiOutOfRange(aqi))?;
    let pm2_5 = reading.components.pm2_5;
    let pm_level = Pm25Level::from_concentration(pm2_5);

    Ok(AirQuality {
        aqi,
        level: level.label().to_string(),
        category: level.category().to_string(),
        pm2_5,
        pm2_5_level: pm_level.label().to_string(),
        pm2_5_category: pm_level.category().to_string(),
        components: reading.components.clone(),
    })
}
