use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    Temperature,
    Presence,
    Light,
}

impl Measurement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Presence => "presence",
            Measurement::Light => "light",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    pub id: String,

    pub name: String,
}

/// Value of a measurement, already converted to degrees Celsius, lux or a
/// presence flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Boolean(bool),
}

impl FieldValue {
    /// Numeric view; booleans become 0 or 1.
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Float(v) => v,
            FieldValue::Boolean(v) => f64::from(u8::from(v)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid timestamp: {0:?}")]
pub struct InvalidTimestamp(pub String);

/// Parses a bridge `lastupdated` value. The bridge reports UTC without an
/// offset (`2019-07-27T20:12:51`); RFC 3339 with an offset is accepted too.
pub fn parse_bridge_time(s: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| InvalidTimestamp(s.to_owned()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    tags: Tags,

    time: String,

    measured_at: DateTime<Utc>,

    measurement: Measurement,

    value: FieldValue,
}

impl MeasurementRecord {
    pub fn new(
        tags: Tags,
        time: impl Into<String>,
        measurement: Measurement,
        value: FieldValue,
    ) -> Result<Self, InvalidTimestamp> {
        let time = time.into();
        let measured_at = parse_bridge_time(&time)?;

        Ok(Self {
            tags,
            time,
            measured_at,
            measurement,
            value,
        })
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// The bridge's timestamp, exactly as reported.
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn measured_at(&self) -> DateTime<Utc> {
        self.measured_at
    }

    pub fn measurement(&self) -> Measurement {
        self.measurement
    }

    pub fn value(&self) -> FieldValue {
        self.value
    }
}
