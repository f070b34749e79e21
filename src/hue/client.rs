use std::{future::Future, time::Duration};

use indexmap::IndexMap;
use log::{Level, debug, info, log_enabled, warn};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::hue::{HttpResponse, HttpTransport, TransportError};

/// Raw sensor objects keyed by bridge identifier, in the order the bridge
/// sent them.
pub type RawSensorCollection = IndexMap<String, Value>;

const RETRYABLE_STATUSES: [u16; 3] = [502, 503, 504];

const MAX_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorSelector {
    All,
    Id(String),
}

/// Retry policy for bridge requests answered with 502, 503 or 504, or not
/// answered at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRetryPolicy {
    pub retries: u32,

    pub backoff_factor: f64,
}

impl Default for FetchRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_factor: 2.0,
        }
    }
}

impl FetchRetryPolicy {
    /// Sleep before the 1-based `retry`: `factor * 2^(retry - 1)`, capped at
    /// two minutes.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);

        Duration::from_secs_f64(secs.max(0.0).min(MAX_BACKOFF.as_secs_f64()))
    }
}

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("bridge responded with status {0}")]
    Status(u16),

    #[error("bridge request failed")]
    Transport(#[source] TransportError),
}

#[derive(Debug, Error)]
#[error("bridge at {endpoint} still failing after {attempts} attempts")]
pub struct TransientFetchError {
    pub endpoint: String,

    pub attempts: u32,

    #[source]
    pub source: FetchFailure,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transient(#[from] TransientFetchError),

    #[error("unexpected payload from {endpoint} (status {status})")]
    Payload {
        endpoint: String,
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

pub trait SensorSource {
    fn fetch_sensors(
        &self,
        selector: &SensorSelector,
    ) -> impl Future<Output = Result<RawSensorCollection, FetchError>> + Send;
}

pub struct BridgeClient<T> {
    address: String,

    credential: String,

    retry: FetchRetryPolicy,

    transport: T,
}

impl<T: HttpTransport> BridgeClient<T> {
    pub fn new(
        address: impl Into<String>,
        credential: impl Into<String>,
        retry: FetchRetryPolicy,
        transport: T,
    ) -> Self {
        Self {
            address: address.into(),
            credential: credential.into(),
            retry,
            transport,
        }
    }

    /// Request URL, and the same URL with the credential masked for logs.
    fn endpoint(&self, selector: &SensorSelector) -> (String, String) {
        let address = self.address.trim_end_matches('/');
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };

        let path = match selector {
            SensorSelector::All => "sensors".to_owned(),
            SensorSelector::Id(id) => format!("sensors/{id}"),
        };

        (
            format!("{base}/api/{}/{path}", self.credential),
            format!("{base}/api/***/{path}"),
        )
    }

    async fn get_with_retry(
        &self,
        url: &str,
        shown: &str,
    ) -> Result<(HttpResponse, Duration), TransientFetchError> {
        let mut retry = 0;

        loop {
            let sent = Instant::now();
            let failure = match self.transport.get(url).await {
                Ok(response) if !RETRYABLE_STATUSES.contains(&response.status) => {
                    return Ok((response, sent.elapsed()));
                }
                Ok(response) => FetchFailure::Status(response.status),
                Err(err) => FetchFailure::Transport(err),
            };

            if retry >= self.retry.retries {
                warn!("Bridge request to {shown} failed ({failure}), exhausted retries");
                return Err(TransientFetchError {
                    endpoint: shown.to_owned(),
                    attempts: retry + 1,
                    source: failure,
                });
            }

            retry += 1;
            let backoff = self.retry.backoff(retry);
            warn!(
                "Bridge request to {shown} failed ({failure}), retry {retry} of {} in {backoff:?}",
                self.retry.retries
            );
            sleep(backoff).await;
        }
    }
}

impl<T: HttpTransport + Sync> SensorSource for BridgeClient<T> {
    async fn fetch_sensors(
        &self,
        selector: &SensorSelector,
    ) -> Result<RawSensorCollection, FetchError> {
        let (url, shown) = self.endpoint(selector);

        info!("Querying {shown}");
        let (response, elapsed) = self.get_with_retry(&url, &shown).await?;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let sensors = match decode_collection(selector, &response.body) {
            Ok(sensors) => {
                info!(
                    "Responded Status Code: {} {} Elements in {elapsed_ms:.0}ms",
                    response.status,
                    sensors.len()
                );
                sensors
            }
            Err(source) => {
                info!(
                    "Responded Status Code: {} unreadable payload in {elapsed_ms:.0}ms",
                    response.status
                );
                return Err(FetchError::Payload {
                    endpoint: shown,
                    status: response.status,
                    source,
                });
            }
        };
        if log_enabled!(Level::Debug) {
            debug!(
                "{}",
                serde_json::to_string_pretty(&sensors).unwrap_or_default()
            );
        }

        Ok(sensors)
    }
}

fn decode_collection(
    selector: &SensorSelector,
    body: &[u8],
) -> Result<RawSensorCollection, serde_json::Error> {
    match selector {
        SensorSelector::All => serde_json::from_slice(body),
        SensorSelector::Id(id) => {
            let sensor: Map<String, Value> = serde_json::from_slice(body)?;
            Ok(IndexMap::from([(id.clone(), Value::Object(sensor))]))
        }
    }
}
