use std::fmt::Write as _;

use crate::measurement::{FieldValue, MeasurementRecord};
use crate::store::{MeasurementStore, StoreConfig, StoreError};

/// InfluxDB 1.x over its HTTP write endpoint.
pub struct InfluxStore {
    client: reqwest::Client,

    write_url: String,

    config: StoreConfig,
}

impl InfluxStore {
    pub fn new(config: &StoreConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            write_url: format!("http://{}:{}/write", config.host, config.port),
            config: config.clone(),
        }
    }
}

impl MeasurementStore for InfluxStore {
    fn identity(&self) -> String {
        format!("InfluxDB:{}", self.config.describe())
    }

    async fn write(&self, records: &[MeasurementRecord]) -> Result<(), StoreError> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.config.database.as_str()), ("precision", "s")])
            .basic_auth(&self.config.username, Some(&self.config.password))
            .body(line_protocol(records))
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() {
                    StoreError::connection(err)
                } else {
                    StoreError::rejected(err)
                }
            })?;

        response.error_for_status().map_err(StoreError::rejected)?;

        Ok(())
    }
}

/// One line per record, timestamps in seconds:
/// `temperature,id=..,name=.. value=21.34 1564258371`.
pub fn line_protocol(records: &[MeasurementRecord]) -> String {
    let mut body = String::new();

    for record in records {
        let tags = record.tags();
        let value = match record.value() {
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Boolean(v) => v.to_string(),
        };

        // writing to a String cannot fail
        let _ = writeln!(
            body,
            "{},id={},name={} value={} {}",
            record.measurement(),
            escape_tag(&tags.id),
            escape_tag(&tags.name),
            value,
            record.measured_at().timestamp()
        );
    }

    body
}

fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            ',' | '=' | ' ' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' | '\r' => escaped.push(' '),
            _ => escaped.push(c),
        }
    }

    escaped
}
