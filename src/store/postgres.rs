use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::measurement::MeasurementRecord;
use crate::store::{MeasurementStore, StoreConfig, StoreError};

/// PostgreSQL (or TimescaleDB) table `sensor_measurements`, see `migrations/`.
pub struct PostgresStore {
    pool: PgPool,

    config: StoreConfig,
}

impl PostgresStore {
    /// The pool connects on first use, so an unreachable server surfaces as a
    /// connection error from `write`.
    pub fn new(config: &StoreConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        Self {
            pool,
            config: config.clone(),
        }
    }
}

impl MeasurementStore for PostgresStore {
    fn identity(&self) -> String {
        format!("PostgreSQL:{}", self.config.describe())
    }

    async fn write(&self, records: &[MeasurementRecord]) -> Result<(), StoreError> {
        bulk_insert_measurements(&self.pool, records)
            .await
            .map_err(classify)
    }
}

pub async fn bulk_insert_measurements(
    pool: &PgPool,
    records: &[MeasurementRecord],
) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let measurements: Vec<String> = records
        .iter()
        .map(|r| r.measurement().as_str().to_owned())
        .collect();
    let sensor_ids: Vec<String> = records.iter().map(|r| r.tags().id.clone()).collect();
    let sensor_names: Vec<String> = records.iter().map(|r| r.tags().name.clone()).collect();
    let measured_ats: Vec<DateTime<Utc>> = records.iter().map(|r| r.measured_at()).collect();
    let values: Vec<f64> = records.iter().map(|r| r.value().as_f64()).collect();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO sensor_measurements (measurement, sensor_id, sensor_name, measured_at, value)
        SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TIMESTAMPTZ[], $5::FLOAT8[])
        ON CONFLICT (measurement, sensor_id, measured_at) DO NOTHING
        "#,
    )
    .bind(measurements)
    .bind(sensor_ids)
    .bind(sensor_names)
    .bind(measured_ats)
    .bind(values)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(())
}

fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::connection(err),
        _ => StoreError::rejected(err),
    }
}
