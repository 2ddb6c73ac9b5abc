//! Moon phase, moonrise and moonset.
//!
//! Everything here is pure: the caller supplies the date, the observer's
//! coordinates and the UTC offset used for display. Positions come from the
//! low-precision lunar series in the Astronomical Almanac, which is good to a
//! fraction of a degree and a few minutes on rise/set times.

use super::types::Coord;
use crate::utils::{format_local_time, is_valid_coordinates};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NOT_AVAILABLE: &str = "N/A";
const NEXT_PHASE_SCAN_DAYS: u64 = 30;
const SCAN_STEP_MINUTES: i64 = 10;
/// Atmospheric refraction at the horizon, degrees.
const HORIZON_REFRACTION: f64 = 0.5667;

#[derive(Error, Debug, PartialEq)]
pub enum MoonError {
    #[error("Invalid coordinates: {lat}, {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    #[error("Timezone offset {0}s is out of range")]
    InvalidTimezoneOffset(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoonPhase {
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

/// Exclusive upper bound of each phase on the 0-28 scale.
const PHASE_BREAKPOINTS: [(f64, MoonPhase); 7] = [
    (1.84, MoonPhase::NewMoon),
    (5.53, MoonPhase::WaxingCrescent),
    (9.22, MoonPhase::FirstQuarter),
    (12.91, MoonPhase::WaxingGibbous),
    (16.61, MoonPhase::FullMoon),
    (20.30, MoonPhase::WaningGibbous),
    (23.99, MoonPhase::LastQuarter),
];

impl MoonPhase {
    pub fn from_phase_number(phase: f64) -> Self {
        PHASE_BREAKPOINTS
            .iter()
            .find(|(upper, _)| phase < *upper)
            .map(|(_, p)| *p)
            .unwrap_or(MoonPhase::WaningCrescent)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "New Moon",
            MoonPhase::WaxingCrescent => "Waxing Crescent",
            MoonPhase::FirstQuarter => "First Quarter",
            MoonPhase::WaxingGibbous => "Waxing Gibbous",
            MoonPhase::FullMoon => "Full Moon",
            MoonPhase::WaningGibbous => "Waning Gibbous",
            MoonPhase::LastQuarter => "Last Quarter",
            MoonPhase::WaningCrescent => "Waning Crescent",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "🌑",
            MoonPhase::WaxingCrescent => "🌒",
            MoonPhase::FirstQuarter => "🌓",
            MoonPhase::WaxingGibbous => "🌔",
            MoonPhase::FullMoon => "🌕",
            MoonPhase::WaningGibbous => "🌖",
            MoonPhase::LastQuarter => "🌗",
            MoonPhase::WaningCrescent => "🌘",
        }
    }

    /// `Waxing Crescent` -> `waxing-crescent`
    pub fn css_class(&self) -> String {
        self.name().to_lowercase().replace(' ', "-")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonPhaseData {
    pub moonrise: String,
    pub moonset: String,
    pub current_phase_name: String,
    pub current_phase_emoji: String,
    pub current_phase_class: String,
    pub next_phase_date: String,
    pub next_phase_name: String,
    pub phase_number: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoonEvents {
    pub rise: Option<DateTime<Utc>>,
    pub set: Option<DateTime<Utc>>,
}

pub fn moon_phase_data(
    date: NaiveDate,
    coord: Coord,
    timezone_offset: i32,
) -> Result<MoonPhaseData, MoonError> {
    if !is_valid_coordinates(coord.lat, coord.lon) {
        return Err(MoonError::InvalidCoordinates {
            lat: coord.lat,
            lon: coord.lon,
        });
    }
    if FixedOffset::east_opt(timezone_offset).is_none() {
        return Err(MoonError::InvalidTimezoneOffset(timezone_offset));
    }

    let phase_number = phase_number(date);
    let phase = MoonPhase::from_phase_number(phase_number);
    let events = rise_and_set(date, coord.lat, coord.lon);

    let format_event = |event: Option<DateTime<Utc>>| {
        event
            .and_then(|at| format_local_time(at, timezone_offset))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    let (next_phase_date, next_phase_name) = match next_phase_change(date) {
        Some((next_date, next_phase)) => (
            next_date.format("%B %d").to_string(),
            next_phase.name().to_string(),
        ),
        None => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
    };

    Ok(MoonPhaseData {
        moonrise: format_event(events.rise),
        moonset: format_event(events.set),
        current_phase_name: phase.name().to_string(),
        current_phase_emoji: phase.symbol().to_string(),
        current_phase_class: phase.css_class(),
        next_phase_date,
        next_phase_name,
        phase_number,
    })
}

/// Position in the lunar cycle on a 0-28 scale (0 = new, 14 = full).
pub fn phase_number(date: NaiveDate) -> f64 {
    let jd = julian_day(date);
    let dt = (jd - 2_382_148.0).powi(2) / (41_048_480.0 * 86_400.0);
    let t = (jd + dt - 2_451_545.0) / 36_525.0;
    let t2 = t * t;
    let t3 = t2 * t;

    let d = normalize_degrees(297.85 + 445_267.1115 * t - 0.00163 * t2 + t3 / 545_868.0);
    let m = normalize_degrees(357.53 + 35_999.0503 * t);
    let m1 = normalize_degrees(134.96 + 477_198.8676 * t + 0.008997 * t2 + t3 / 69_699.0);

    let elongation = d + 6.29 * sin_deg(m1) - 2.10 * sin_deg(m)
        + 1.27 * sin_deg(2.0 * d - m1)
        + 0.66 * sin_deg(2.0 * d);
    let elongation = normalize_degrees(elongation).round_ties_even();

    let phase = (elongation + 6.43) / 360.0 * 28.0;
    if phase >= 28.0 {
        phase - 28.0
    } else {
        phase
    }
}

/// First date within the next 30 days whose phase differs from `date`'s.
pub fn next_phase_change(date: NaiveDate) -> Option<(NaiveDate, MoonPhase)> {
    let today = MoonPhase::from_phase_number(phase_number(date));

    (1..=NEXT_PHASE_SCAN_DAYS)
        .filter_map(|offset| date.checked_add_days(chrono::Days::new(offset)))
        .map(|day| (day, MoonPhase::from_phase_number(phase_number(day))))
        .find(|(_, phase)| *phase != today)
}

/// Moonrise and moonset during the UTC day `date` at the given coordinates.
pub fn rise_and_set(date: NaiveDate, lat: f64, lon: f64) -> MoonEvents {
    let mut events = MoonEvents { rise: None, set: None };
    let Some(start) = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()) else {
        return events;
    };

    let step = Duration::minutes(SCAN_STEP_MINUTES);
    let steps = 24 * 60 / SCAN_STEP_MINUTES;

    let mut prev_at = start;
    let mut prev_height = horizon_height(prev_at, lat, lon);

    for i in 1..=steps {
        let at = start + step * i as i32;
        let height = horizon_height(at, lat, lon);

        if prev_height < 0.0 && height >= 0.0 && events.rise.is_none() {
            events.rise = Some(interpolate(prev_at, prev_height, at, height));
        } else if prev_height >= 0.0 && height < 0.0 && events.set.is_none() {
            events.set = Some(interpolate(prev_at, prev_height, at, height));
        }

        if events.rise.is_some() && events.set.is_some() {
            break;
        }
        prev_at = at;
        prev_height = height;
    }

    events
}

/// Degrees of the moon's upper limb above the refracted horizon.
fn horizon_height(at: DateTime<Utc>, lat: f64, lon: f64) -> f64 {
    let (altitude, parallax) = topocentric_altitude(at, lat, lon);
    altitude + HORIZON_REFRACTION + 0.2725 * parallax
}

fn interpolate(
    t0: DateTime<Utc>,
    h0: f64,
    t1: DateTime<Utc>,
    h1: f64,
) -> DateTime<Utc> {
    let span = (t1 - t0).num_seconds() as f64;
    let fraction = if h1 == h0 { 0.0 } else { h0 / (h0 - h1) };
    t0 + Duration::seconds((span * fraction).round() as i64)
}

/// Topocentric altitude of the moon's centre and its horizontal parallax, degrees.
fn topocentric_altitude(at: DateTime<Utc>, lat: f64, lon: f64) -> (f64, f64) {
    let jd = at.timestamp() as f64 / 86_400.0 + 2_440_587.5;
    let t = (jd - 2_451_545.0) / 36_525.0;

    let longitude = 218.32 + 481_267.881 * t
        + 6.29 * sin_deg(135.0 + 477_198.87 * t)
        - 1.27 * sin_deg(259.3 - 413_335.36 * t)
        + 0.66 * sin_deg(235.7 + 890_534.22 * t)
        + 0.21 * sin_deg(269.9 + 954_397.74 * t)
        - 0.19 * sin_deg(357.5 + 35_999.05 * t)
        - 0.11 * sin_deg(186.5 + 966_404.03 * t);
    let latitude = 5.13 * sin_deg(93.3 + 483_202.02 * t)
        + 0.28 * sin_deg(228.2 + 960_400.89 * t)
        - 0.28 * sin_deg(318.3 + 6_003.15 * t)
        - 0.17 * sin_deg(217.6 - 407_332.21 * t);
    let parallax = 0.9508
        + 0.0518 * cos_deg(135.0 + 477_198.87 * t)
        + 0.0095 * cos_deg(259.3 - 413_335.36 * t)
        + 0.0078 * cos_deg(235.7 + 890_534.22 * t)
        + 0.0028 * cos_deg(269.9 + 954_397.74 * t);

    let obliquity = 23.439 - 0.013 * t;

    let right_ascension = (sin_deg(longitude) * cos_deg(obliquity)
        - tan_deg(latitude) * sin_deg(obliquity))
    .atan2(cos_deg(longitude))
    .to_degrees();
    let declination = (sin_deg(latitude) * cos_deg(obliquity)
        + cos_deg(latitude) * sin_deg(obliquity) * sin_deg(longitude))
    .asin()
    .to_degrees();

    let sidereal = normalize_degrees(280.460_618_37 + 360.985_647_366_29 * (jd - 2_451_545.0));
    let hour_angle = sidereal + lon - right_ascension;

    let geocentric = (sin_deg(lat) * sin_deg(declination)
        + cos_deg(lat) * cos_deg(declination) * cos_deg(hour_angle))
    .asin()
    .to_degrees();

    (geocentric - parallax * cos_deg(geocentric), parallax)
}

/// Julian day at 0h UTC of the given calendar date.
fn julian_day(date: NaiveDate) -> f64 {
    let (mut year, mut month) = (date.year() as f64, date.month() as f64);
    if month <= 2.0 {
        year -= 1.0;
        month += 12.0;
    }

    let a = (year / 100.0).trunc();
    let b = 2.0 - a + (a / 4.0).trunc();

    (365.25 * (year + 4716.0)).trunc() + (30.6001 * (month + 1.0)).trunc() + date.day() as f64 + b
        - 1524.5
}

fn normalize_degrees(value: f64) -> f64 {
    value.rem_euclid(360.0)
}

fn sin_deg(degrees: f64) -> f64 {
    degrees.to_radians().sin()
}

fn cos_deg(degrees: f64) -> f64 {
    degrees.to_radians().cos()
}

fn tan_deg(degrees: f64) -> f64 {
    degrees.to_radians().tan()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const DHAKA: Coord = Coord { lat: 23.8103, lon: 90.4125 };

    #[test]
    fn test_phase_brackets() {
        assert_eq!(MoonPhase::from_phase_number(0.0), MoonPhase::NewMoon);
        assert_eq!(MoonPhase::from_phase_number(1.83), MoonPhase::NewMoon);
        assert_eq!(MoonPhase::from_phase_number(1.84), MoonPhase::WaxingCrescent);
        assert_eq!(MoonPhase::from_phase_number(5.53), MoonPhase::FirstQuarter);
        assert_eq!(MoonPhase::from_phase_number(14.0), MoonPhase::FullMoon);
        assert_eq!(MoonPhase::from_phase_number(16.61), MoonPhase::WaningGibbous);
        assert_eq!(MoonPhase::from_phase_number(23.98), MoonPhase::LastQuarter);
        assert_eq!(MoonPhase::from_phase_number(23.99), MoonPhase::WaningCrescent);
        assert_eq!(MoonPhase::from_phase_number(29.53), MoonPhase::WaningCrescent);
    }

    #[test]
    fn test_phase_presentation() {
        assert_eq!(MoonPhase::WaxingCrescent.css_class(), "waxing-crescent");
        assert_eq!(MoonPhase::FullMoon.symbol(), "🌕");
        assert_eq!(MoonPhase::LastQuarter.name(), "Last Quarter");
    }

    #[test]
    fn test_julian_day_epoch() {
        assert_eq!(julian_day(date(2000, 1, 1)), 2_451_544.5);
        assert_eq!(julian_day(date(2024, 3, 1)), 2_460_370.5);
    }

    #[test]
    fn test_phase_number_tracks_known_lunations() {
        // New moon 2024-01-11, first quarter 2024-01-18, full moon 2024-01-25.
        let after_new = phase_number(date(2024, 1, 12));
        assert_eq!(MoonPhase::from_phase_number(after_new), MoonPhase::NewMoon);

        let first_quarter = phase_number(date(2024, 1, 18));
        assert_eq!(MoonPhase::from_phase_number(first_quarter), MoonPhase::FirstQuarter);

        let full = phase_number(date(2024, 1, 25));
        assert_eq!(MoonPhase::from_phase_number(full), MoonPhase::FullMoon);
    }

    #[test]
    fn test_phase_number_stays_in_range() {
        let start = date(2024, 1, 1);
        for offset in 0..400 {
            let day = start + Duration::days(offset);
            let phase = phase_number(day);
            assert!((0.0..28.0).contains(&phase), "{} -> {}", day, phase);
        }
    }

    #[test]
    fn test_next_phase_change_differs_from_today() {
        let today = date(2024, 1, 25);
        let (next_date, next_phase) = next_phase_change(today).unwrap();

        assert!(next_date > today);
        assert!(next_date <= today + Duration::days(30));
        assert_ne!(next_phase, MoonPhase::FullMoon);
        assert_eq!(next_phase, MoonPhase::WaningGibbous);
    }

    #[test]
    fn test_full_moon_rises_near_dusk() {
        let events = rise_and_set(date(2024, 1, 25), DHAKA.lat, DHAKA.lon);
        let rise = events.rise.unwrap();

        let earliest = date(2024, 1, 25).and_hms_opt(10, 0, 0).unwrap().and_utc();
        let latest = date(2024, 1, 25).and_hms_opt(13, 30, 0).unwrap().and_utc();
        assert!(rise > earliest && rise < latest, "moonrise at {}", rise);
    }

    #[test]
    fn test_events_sit_on_the_horizon() {
        let events = rise_and_set(date(2024, 6, 10), 51.5, -0.12);

        for at in [events.rise, events.set].into_iter().flatten() {
            let height = horizon_height(at, 51.5, -0.12);
            assert!(height.abs() < 0.5, "height {} at {}", height, at);
        }
        if let Some(rise) = events.rise {
            let later = horizon_height(rise + Duration::minutes(30), 51.5, -0.12);
            assert!(later > 0.0);
        }
    }

    #[test]
    fn test_moon_phase_data_formats_local_times() {
        let data = moon_phase_data(date(2024, 1, 25), DHAKA, 6 * 3600).unwrap();

        assert_eq!(data.current_phase_name, "Full Moon");
        assert_eq!(data.current_phase_emoji, "🌕");
        assert_eq!(data.current_phase_class, "full-moon");
        assert!(data.moonrise.ends_with("PM"), "moonrise {}", data.moonrise);
        assert_eq!(data.next_phase_name, "Waning Gibbous");
        assert!(data.next_phase_date.starts_with("January") || data.next_phase_date.starts_with("February"));
    }

    #[test]
    fn test_moon_phase_data_rejects_bad_input() {
        let bad_coord = Coord { lat: 95.0, lon: 0.0 };
        assert!(matches!(
            moon_phase_data(date(2024, 1, 25), bad_coord, 0),
            Err(MoonError::InvalidCoordinates { .. })
        ));
        assert_eq!(
            moon_phase_data(date(2024, 1, 25), DHAKA, 100_000),
            Err(MoonError::InvalidTimezoneOffset(100_000))
        );
    }
}
