use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::sleep;

use crate::measurement::MeasurementRecord;
use crate::store::{MeasurementStore, StoreError};

/// Retry policy for writes that fail because the store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRetryPolicy {
    pub retries: u32,

    pub delay: Duration,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
#[error("store still unreachable after {attempts} attempts")]
pub struct PersistenceExhaustedError {
    pub attempts: u32,

    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Exhausted(#[from] PersistenceExhaustedError),

    #[error("store write failed")]
    Rejected(#[source] StoreError),
}

pub struct PersistenceWriter<S> {
    store: S,

    retry: StoreRetryPolicy,

    announced: bool,
}

impl<S: MeasurementStore> PersistenceWriter<S> {
    pub fn new(store: S, retry: StoreRetryPolicy) -> Self {
        Self {
            store,
            retry,
            announced: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Writes the batch in one call, retrying only connection failures.
    pub async fn persist(&mut self, records: &[MeasurementRecord]) -> Result<(), PersistError> {
        if records.is_empty() {
            debug!("No measurements to persist");
            return Ok(());
        }

        if !self.announced {
            info!("Connecting to {}", self.store.identity());
            self.announced = true;
        }

        let mut retry = 0;
        loop {
            match self.store.write(records).await {
                Ok(()) => {
                    info!("Successfully persisted {} values", records.len());
                    return Ok(());
                }
                Err(StoreError::Connection(_)) if retry < self.retry.retries => {
                    retry += 1;
                    warn!(
                        "Unable to connect to store, will sleep {:?} and retry ({retry} of {})",
                        self.retry.delay, self.retry.retries
                    );
                    sleep(self.retry.delay).await;
                }
                Err(err @ StoreError::Connection(_)) => {
                    warn!("Unable to connect to store, exhausted retries");
                    return Err(PersistenceExhaustedError {
                        attempts: retry + 1,
                        source: err,
                    }
                    .into());
                }
                Err(err) => return Err(PersistError::Rejected(err)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::measurement::{FieldValue, Measurement, Tags};
    use std::collections::VecDeque;
    use std::error::Error as _;
    use std::io;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct ScriptedStore {
        failures: Mutex<VecDeque<StoreError>>,
        writes: Mutex<Vec<usize>>,
    }

    impl ScriptedStore {
        fn failing(failures: impl IntoIterator<Item = StoreError>) -> Self {
            Self {
                failures: Mutex::new(failures.into_iter().collect()),
                writes: Mutex::default(),
            }
        }

        fn writes(&self) -> Vec<usize> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl MeasurementStore for ScriptedStore {
        fn identity(&self) -> String {
            "scripted store".into()
        }

        async fn write(&self, records: &[MeasurementRecord]) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(records.len());
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn refused(n: usize) -> Vec<StoreError> {
        (0..n)
            .map(|i| {
                StoreError::connection(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("refused #{}", i + 1),
                ))
            })
            .collect()
    }

    fn batch() -> Vec<MeasurementRecord> {
        ["2019-07-27T20:12:51", "2019-07-27T20:13:02"]
            .into_iter()
            .map(|time| {
                MeasurementRecord::new(
                    Tags {
                        id: "a-0402".into(),
                        name: "Kitchen".into(),
                    },
                    time,
                    Measurement::Temperature,
                    FieldValue::Float(20.5),
                )
                .unwrap()
            })
            .collect()
    }

    fn assert_elapsed(started: Instant, secs: u64) {
        let elapsed = started.elapsed();
        let expected = Duration::from_secs(secs);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn writes_whole_batch_once() {
        let mut writer =
            PersistenceWriter::new(ScriptedStore::default(), StoreRetryPolicy::default());

        writer.persist(&batch()).await.unwrap();

        assert_eq!(writer.store().writes(), [2]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_connection_failures() {
        let store = ScriptedStore::failing(refused(3));
        let mut writer = PersistenceWriter::new(store, StoreRetryPolicy::default());

        let started = Instant::now();
        writer.persist(&batch()).await.unwrap();

        assert_eq!(writer.store().writes(), [2, 2, 2, 2]);
        assert_elapsed(started, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_last_cause() {
        let store = ScriptedStore::failing(refused(6));
        let mut writer = PersistenceWriter::new(store, StoreRetryPolicy::default());

        let started = Instant::now();
        let err = writer.persist(&batch()).await.unwrap_err();

        let PersistError::Exhausted(err) = err else {
            panic!("expected exhausted retries, got {err:?}");
        };
        assert_eq!(err.attempts, 6);
        let StoreError::Connection(cause) = &err.source else {
            panic!("expected connection error, got {:?}", err.source);
        };
        assert_eq!(cause.to_string(), "refused #6");
        assert!(err.source().is_some());
        assert_eq!(writer.store().writes().len(), 6);
        assert_elapsed(started, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_writes_are_not_retried() {
        let rejection = StoreError::rejected(io::Error::other("401 Unauthorized"));
        let store = ScriptedStore::failing([rejection]);
        let mut writer = PersistenceWriter::new(store, StoreRetryPolicy::default());

        let started = Instant::now();
        let err = writer.persist(&batch()).await.unwrap_err();

        assert!(matches!(err, PersistError::Rejected(StoreError::Rejected(_))));
        assert_eq!(writer.store().writes().len(), 1);
        assert_elapsed(started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_skips_the_store() {
        let mut writer =
            PersistenceWriter::new(ScriptedStore::default(), StoreRetryPolicy::default());

        writer.persist(&[]).await.unwrap();

        assert!(writer.store().writes().is_empty());
        assert!(!writer.announced);
    }

    #[tokio::test(start_paused = true)]
    async fn announces_store_once() {
        let mut writer =
            PersistenceWriter::new(ScriptedStore::default(), StoreRetryPolicy::default());

        writer.persist(&batch()).await.unwrap();
        assert!(writer.announced);
        writer.persist(&batch()).await.unwrap();
        assert!(writer.announced);
        assert_eq!(writer.store().writes(), [2, 2]);
    }
}
