mod influx;
mod postgres;
mod writer;

use std::{error::Error as StdError, fmt, future::Future};

use serde::Deserialize;
use thiserror::Error;

use crate::measurement::MeasurementRecord;

pub use influx::*;
pub use postgres::*;
pub use writer::*;

#[derive(Deserialize, Clone)]
pub struct StoreConfig {
    pub host: String,

    pub port: u16,

    pub username: String,

    pub password: String,

    pub database: String,
}

impl StoreConfig {
    pub fn describe(&self) -> String {
        format!(
            "{} on {}:{} as {}",
            self.database, self.host, self.port, self.username
        )
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Influx,
    Postgres,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to connect to the store")]
    Connection(#[source] Box<dyn StdError + Send + Sync>),

    #[error("store rejected the write")]
    Rejected(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn connection(source: impl StdError + Send + Sync + 'static) -> Self {
        StoreError::Connection(Box::new(source))
    }

    pub fn rejected(source: impl StdError + Send + Sync + 'static) -> Self {
        StoreError::Rejected(Box::new(source))
    }
}

/// A time-series backend accepting a whole batch per write.
pub trait MeasurementStore {
    /// Human readable target, e.g. `InfluxDB:home on localhost:8086 as grafana`.
    fn identity(&self) -> String;

    fn write(
        &self,
        records: &[MeasurementRecord],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub enum Store {
    Influx(InfluxStore),
    Postgres(PostgresStore),
}

impl Store {
    pub fn from_config(
        backend: StoreBackend,
        config: &StoreConfig,
        client: reqwest::Client,
    ) -> Self {
        match backend {
            StoreBackend::Influx => Store::Influx(InfluxStore::new(config, client)),
            StoreBackend::Postgres => Store::Postgres(PostgresStore::new(config)),
        }
    }
}

impl MeasurementStore for Store {
    fn identity(&self) -> String {
        match self {
            Store::Influx(store) => store.identity(),
            Store::Postgres(store) => store.identity(),
        }
    }

    async fn write(&self, records: &[MeasurementRecord]) -> Result<(), StoreError> {
        match self {
            Store::Influx(store) => store.write(records).await,
            Store::Postgres(store) => store.write(records).await,
        }
    }
}
