use std::str::FromStr;

use anyhow::{Error, bail};

use crate::measurement::Measurement;

/// Zigbee sensor types the bridge reports that carry a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Presence,
    LightLevel,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "ZLLTemperature",
            SensorKind::Presence => "ZLLPresence",
            SensorKind::LightLevel => "ZLLLightLevel",
        }
    }

    pub fn measurement(&self) -> Measurement {
        match self {
            SensorKind::Temperature => Measurement::Temperature,
            SensorKind::Presence => Measurement::Presence,
            SensorKind::LightLevel => Measurement::Light,
        }
    }
}

impl FromStr for SensorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ZLLTemperature" => Ok(SensorKind::Temperature),
            "ZLLPresence" => Ok(SensorKind::Presence),
            "ZLLLightLevel" => Ok(SensorKind::LightLevel),
            _ => bail!("unsupported sensor type: {}", s),
        }
    }
}
