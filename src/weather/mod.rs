pub mod aggregate;
pub mod air_quality;
pub mod cache;
pub mod moon;
pub mod openweather;
pub mod types;
