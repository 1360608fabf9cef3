//! Air reading model.

use airbuddy_hw::Measurement;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Timelike};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Four-level air-quality rating derived from the device index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "Very good")]
    VeryGood,
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Ok")]
    Ok,
    #[serde(rename = "Poor")]
    Poor,
}

impl Rating {
    /// Maps the device air-quality index (1 = excellent .. 5 = unhealthy).
    pub fn from_index(index: u8) -> Self {
        match index {
            0 | 1 => Rating::VeryGood,
            2 => Rating::Good,
            3 => Rating::Ok,
            _ => Rating::Poor,
        }
    }

    /// Returns the display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::VeryGood => "Very good",
            Rating::Good => "Good",
            Rating::Ok => "Ok",
            Rating::Poor => "Poor",
        }
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "very good" => Ok(Rating::VeryGood),
            "good" => Ok(Rating::Good),
            "ok" => Ok(Rating::Ok),
            "poor" => Ok(Rating::Poor),
            _ => Err(format!("Unknown rating: {}", s)),
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Requested with the button.
    Button,
    /// Taken by the background scheduler.
    Scheduled,
    /// Copied from the last logged reading because the sensor failed.
    Fallback,
}

impl Provenance {
    /// Label shown next to values on the display.
    pub fn freshness(&self) -> &'static str {
        match self {
            Provenance::Button | Provenance::Scheduled => "just now",
            Provenance::Fallback => "cached",
        }
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "button" => Ok(Provenance::Button),
            "scheduled" => Ok(Provenance::Scheduled),
            "fallback" => Ok(Provenance::Fallback),
            _ => Err(format!("Unknown provenance: {}", s)),
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Button => write!(f, "button"),
            Provenance::Scheduled => write!(f, "scheduled"),
            Provenance::Fallback => write!(f, "fallback"),
        }
    }
}

/// One timestamped set of measurements with its rating and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Local time with offset, second precision
    pub timestamp: DateTime<FixedOffset>,
    /// Temperature in degrees Celsius (two decimals)
    pub temperature_c: f64,
    /// Relative humidity in percent (two decimals)
    pub humidity: f64,
    /// Equivalent CO2 in ppm
    pub eco2_ppm: u16,
    /// TVOC in ppb
    pub tvoc_ppb: u16,
    /// Raw device air-quality index
    pub aqi: u8,
    /// Rating derived from `aqi`
    pub rating: Rating,
    /// Origin of the reading
    pub provenance: Provenance,
}

impl Reading {
    /// Builds a reading from a fresh sensor sample.
    pub fn from_measurement(
        measurement: &Measurement,
        provenance: Provenance,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            timestamp,
            temperature_c: round2(measurement.temperature_c),
            humidity: round2(measurement.humidity),
            eco2_ppm: measurement.eco2_ppm,
            tvoc_ppb: measurement.tvoc_ppb,
            aqi: measurement.aqi,
            rating: Rating::from_index(measurement.aqi),
            provenance,
        }
    }

    /// Copies the measurement fields under a new timestamp, tagged `fallback`.
    pub fn as_fallback(&self, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            provenance: Provenance::Fallback,
            ..self.clone()
        }
    }

    /// Returns true if every measurement field matches `other`.
    #[cfg(test)]
    pub fn same_measurements(&self, other: &Reading) -> bool {
        self.temperature_c == other.temperature_c
            && self.humidity == other.humidity
            && self.eco2_ppm == other.eco2_ppm
            && self.tvoc_ppb == other.tvoc_ppb
            && self.aqi == other.aqi
            && self.rating == other.rating
    }

    /// ISO-8601 timestamp as written to the log.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Current local time, truncated to whole seconds.
pub fn now_local() -> DateTime<FixedOffset> {
    let now: DateTime<FixedOffset> = Local::now().into();
    now.with_nanosecond(0).unwrap_or(now)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_measurement(aqi: u8) -> Measurement {
        Measurement {
            temperature_c: 21.456,
            humidity: 40.254,
            eco2_ppm: 612,
            tvoc_ppb: 87,
            aqi,
        }
    }

    #[test]
    fn test_rating_mapping() {
        assert_eq!(Rating::from_index(0), Rating::VeryGood);
        assert_eq!(Rating::from_index(1), Rating::VeryGood);
        assert_eq!(Rating::from_index(2), Rating::Good);
        assert_eq!(Rating::from_index(3), Rating::Ok);
        assert_eq!(Rating::from_index(4), Rating::Poor);
        assert_eq!(Rating::from_index(5), Rating::Poor);
        assert_eq!(Rating::from_index(u8::MAX), Rating::Poor);
    }

    #[test]
    fn test_rating_is_monotonic() {
        let rank = |r: Rating| match r {
            Rating::VeryGood => 0,
            Rating::Good => 1,
            Rating::Ok => 2,
            Rating::Poor => 3,
        };
        for index in 0..u8::MAX {
            assert!(rank(Rating::from_index(index)) <= rank(Rating::from_index(index + 1)));
        }
    }

    #[test]
    fn test_rating_strings() {
        assert_eq!(Rating::VeryGood.to_string(), "Very good");
        assert_eq!("Very good".parse::<Rating>().unwrap(), Rating::VeryGood);
        assert_eq!("ok".parse::<Rating>().unwrap(), Rating::Ok);
        assert!("great".parse::<Rating>().is_err());
    }

    #[test]
    fn test_provenance_strings() {
        assert_eq!(Provenance::Scheduled.to_string(), "scheduled");
        assert_eq!(
            "fallback".parse::<Provenance>().unwrap(),
            Provenance::Fallback
        );
        assert_eq!(Provenance::Button.freshness(), "just now");
        assert_eq!(Provenance::Fallback.freshness(), "cached");
    }

    #[test]
    fn test_from_measurement_rounds() {
        let reading =
            Reading::from_measurement(&sample_measurement(2), Provenance::Button, now_local());
        assert_eq!(reading.temperature_c, 21.46);
        assert_eq!(reading.humidity, 40.25);
        assert_eq!(reading.rating, Rating::Good);
        assert_eq!(reading.provenance, Provenance::Button);
    }

    #[test]
    fn test_as_fallback() {
        let original = Reading::from_measurement(
            &sample_measurement(3),
            Provenance::Scheduled,
            DateTime::parse_from_rfc3339("2025-01-01T08:00:00+01:00").unwrap(),
        );
        let later = DateTime::parse_from_rfc3339("2025-01-01T09:30:00+01:00").unwrap();
        let fallback = original.as_fallback(later);

        assert_eq!(fallback.provenance, Provenance::Fallback);
        assert_eq!(fallback.timestamp, later);
        assert!(fallback.same_measurements(&original));
    }

    #[test]
    fn test_now_local_has_whole_seconds() {
        assert_eq!(now_local().nanosecond(), 0);
    }

    #[test]
    fn test_json_shape() {
        let reading = Reading::from_measurement(
            &sample_measurement(1),
            Provenance::Button,
            DateTime::parse_from_rfc3339("2025-01-01T08:00:00+01:00").unwrap(),
        );
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["rating"], "Very good");
        assert_eq!(json["provenance"], "button");
        assert_eq!(json["eco2_ppm"], 612);
    }
}
