use log::warn;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::hue::{RawSensorCollection, SensorKind};
use crate::measurement::{FieldValue, InvalidTimestamp, MeasurementRecord, Tags};

#[derive(Debug, Error)]
pub enum MalformedEntry {
    #[error("sensor entry has no string `type`")]
    MissingType,

    #[error("sensor entry does not match the {kind} layout")]
    Shape {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("sensor entry has an unusable `lastupdated`")]
    Timestamp(#[from] InvalidTimestamp),
}

#[derive(Debug, Deserialize)]
struct RawSensor<S> {
    uniqueid: String,
    name: String,
    state: S,
}

#[derive(Debug, Deserialize)]
struct TemperatureState {
    temperature: i64,
    lastupdated: String,
}

#[derive(Debug, Deserialize)]
struct PresenceState {
    presence: bool,
    lastupdated: String,
}

#[derive(Debug, Deserialize)]
struct LightLevelState {
    lightlevel: u16,
    lastupdated: String,
}

/// Hundredths of a degree to degrees Celsius.
pub fn celsius_from_raw(raw: i64) -> f64 {
    raw as f64 / 100.0
}

/// The bridge reports light as `10000 * log10(lux) + 1`, within `u16`.
pub fn lux_from_raw(raw: u16) -> f64 {
    10f64.powf((f64::from(raw) - 1.0) / 10000.0)
}

/// Converts the supported sensors of a bridge response, in bridge order.
/// Unsupported types are skipped silently; malformed entries are skipped
/// with a warning.
pub fn normalize(sensors: &RawSensorCollection) -> Vec<MeasurementRecord> {
    sensors
        .values()
        .filter_map(|entry| match normalize_entry(entry) {
            Ok(record) => record,
            Err(err) => {
                warn!("Encountered unexpected sensor format, skipping sensor: {err}");
                warn!("Unexpected sensor json: {entry}");
                None
            }
        })
        .collect()
}

/// `Ok(None)` for sensor types that carry no measurement.
pub fn normalize_entry(entry: &Value) -> Result<Option<MeasurementRecord>, MalformedEntry> {
    let Some(sensor_type) = entry.get("type").and_then(Value::as_str) else {
        return Err(MalformedEntry::MissingType);
    };
    let Ok(kind) = sensor_type.parse::<SensorKind>() else {
        return Ok(None);
    };

    let (tags, lastupdated, value) = match kind {
        SensorKind::Temperature => {
            let raw: RawSensor<TemperatureState> = decode(kind, entry)?;
            let value = FieldValue::Float(celsius_from_raw(raw.state.temperature));
            (tags(raw.uniqueid, raw.name), raw.state.lastupdated, value)
        }
        SensorKind::Presence => {
            let raw: RawSensor<PresenceState> = decode(kind, entry)?;
            let value = FieldValue::Boolean(raw.state.presence);
            (tags(raw.uniqueid, raw.name), raw.state.lastupdated, value)
        }
        SensorKind::LightLevel => {
            let raw: RawSensor<LightLevelState> = decode(kind, entry)?;
            let value = FieldValue::Float(lux_from_raw(raw.state.lightlevel));
            (tags(raw.uniqueid, raw.name), raw.state.lastupdated, value)
        }
    };

    let record = MeasurementRecord::new(tags, lastupdated, kind.measurement(), value)?;

    Ok(Some(record))
}

fn decode<'de, T: Deserialize<'de>>(
    kind: SensorKind,
    entry: &'de Value,
) -> Result<T, MalformedEntry> {
    T::deserialize(entry).map_err(|source| MalformedEntry::Shape {
        kind: kind.as_str(),
        source,
    })
}

fn tags(id: String, name: String) -> Tags {
    Tags { id, name }
}
