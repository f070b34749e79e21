use std::time::Duration;

use log::{info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::hue::{FetchError, SensorSelector, SensorSource};
use crate::measurement::MeasurementRecord;
use crate::normalize::normalize;
use crate::store::{MeasurementStore, PersistError, PersistenceWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    Unbounded,
    Finite(u64),
}

impl Iterations {
    /// `-1` (or any negative count) loops forever.
    pub fn from_count(count: i64) -> Self {
        match u64::try_from(count) {
            Ok(n) => Iterations::Finite(n),
            Err(_) => Iterations::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Sleeping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch sensors from the bridge")]
    Fetch(#[from] FetchError),

    #[error("failed to persist measurements")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,

    pub persisted: usize,

    pub interrupted: bool,
}

pub struct PollLoop<Src, St> {
    source: Src,

    writer: PersistenceWriter<St>,

    selector: SensorSelector,

    iterations: Iterations,

    sleep: Duration,

    state: LoopState,
}

impl<Src: SensorSource, St: MeasurementStore> PollLoop<Src, St> {
    pub fn new(
        source: Src,
        writer: PersistenceWriter<St>,
        selector: SensorSelector,
        iterations: Iterations,
        sleep: Duration,
    ) -> Self {
        Self {
            source,
            writer,
            selector,
            iterations,
            sleep,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn writer(&self) -> &PersistenceWriter<St> {
        &self.writer
    }

    /// Fetch, normalize and persist once.
    pub async fn run_cycle(&mut self) -> Result<Vec<MeasurementRecord>, PipelineError> {
        let sensors = self.source.fetch_sensors(&self.selector).await?;
        let records = normalize(&sensors);
        self.writer.persist(&records).await?;

        info!("{}", summary_line(&records));

        Ok(records)
    }

    /// Runs cycles until the iteration bound is reached or `shutdown` turns
    /// true. Shutdown is observed between cycles and while sleeping, never in
    /// the middle of a cycle. Fetch and persist errors end the loop.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        self.state = LoopState::Running;

        loop {
            if *shutdown.borrow() {
                warn!("Process interrupted, ending loop");
                summary.interrupted = true;
                break;
            }
            if self.is_done(summary.cycles) {
                break;
            }

            let cycle = summary.cycles + 1;
            self.log_progress(cycle);

            let records = match self.run_cycle().await {
                Ok(records) => records,
                Err(err) => {
                    self.state = LoopState::Stopped;
                    return Err(err);
                }
            };
            summary.cycles = cycle;
            summary.persisted += records.len();

            if self.is_done(summary.cycles) {
                break;
            }

            self.state = LoopState::Sleeping;
            tokio::select! {
                _ = sleep(self.sleep) => {}
                _ = cancelled(&mut shutdown) => {}
            }
            self.state = LoopState::Running;
        }

        self.state = LoopState::Stopped;
        Ok(summary)
    }

    fn is_done(&self, cycles: u64) -> bool {
        matches!(self.iterations, Iterations::Finite(n) if cycles >= n)
    }

    fn log_progress(&self, cycle: u64) {
        match self.iterations {
            Iterations::Unbounded if cycle == 1 => {
                info!("Beginning to infinitely loop with {:?} sleep", self.sleep)
            }
            Iterations::Finite(n) if cycle == 1 || cycle % 10 == 0 => {
                info!(
                    "Iteration {cycle} of {n} for main processing loop with {:?} sleep",
                    self.sleep
                )
            }
            _ => {}
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender never requests it.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// `Sensor Data...temperature:21.34(20:12:51 UTC) presence:true(20:13:02 UTC) `
pub fn summary_line(records: &[MeasurementRecord]) -> String {
    let mut summary = String::from("Sensor Data...");

    for record in records {
        summary.push_str(&format!(
            "{}:{}({} UTC) ",
            record.measurement(),
            record.value(),
            record.measured_at().format("%H:%M:%S")
        ));
    }

    summary
}
