use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use hue_sensor_stats::{
    hue::{
        BridgeClient, FetchRetryPolicy, HttpResponse, HttpTransport, SensorSelector,
        TransportError,
    },
    measurement::{FieldValue, Measurement, MeasurementRecord},
    poll::{Iterations, PipelineError, PollLoop},
    store::{
        MeasurementStore, PersistError, PersistenceWriter, StoreError, StoreRetryPolicy,
        line_protocol,
    },
};
use tokio::sync::watch;

const SENSORS: &str = r#"{
    "1": {"state": {"daylight": false, "lastupdated": "2019-07-27T20:10:00"},
          "name": "Daylight", "type": "Daylight"},
    "5": {"state": {"temperature": 2134, "lastupdated": "2019-07-27T20:12:51"},
          "name": "Hue temperature sensor 1", "type": "ZLLTemperature",
          "uniqueid": "00:17:88:01:02:00:b5:d1-02-0402"},
    "6": {"state": {"presence": true, "lastupdated": "2019-07-27T20:13:02"},
          "name": "Hallway sensor", "type": "ZLLPresence",
          "uniqueid": "00:17:88:01:02:00:b5:d1-02-0406"},
    "7": {"state": {"lightlevel": 1, "dark": true, "lastupdated": "2019-07-27T20:12:40"},
          "name": "Hue ambient light sensor 1", "type": "ZLLLightLevel",
          "uniqueid": "00:17:88:01:02:00:b5:d1-02-0400"}
}"#;

struct Bridge {
    responses: Mutex<VecDeque<u16>>,
}

impl Bridge {
    fn answering(statuses: &[u16]) -> Self {
        Self {
            responses: Mutex::new(statuses.iter().copied().collect()),
        }
    }
}

impl HttpTransport for Bridge {
    async fn get(&self, _url: &str) -> Result<HttpResponse, TransportError> {
        let status = self.responses.lock().unwrap().pop_front().unwrap_or(200);
        let body = if status == 200 {
            SENSORS.as_bytes().to_vec()
        } else {
            Vec::new()
        };
        Ok(HttpResponse { status, body })
    }
}

#[derive(Default)]
struct Recorder {
    connection_failures: Mutex<u32>,
    lines: Mutex<Vec<String>>,
}

impl MeasurementStore for Recorder {
    fn identity(&self) -> String {
        "recorder".into()
    }

    async fn write(&self, records: &[MeasurementRecord]) -> Result<(), StoreError> {
        let mut failures = self.connection_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(StoreError::connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        self.lines.lock().unwrap().push(line_protocol(records));
        Ok(())
    }
}

fn pipeline(
    bridge: Bridge,
    store: Recorder,
    iterations: Iterations,
) -> PollLoop<BridgeClient<Bridge>, Recorder> {
    PollLoop::new(
        BridgeClient::new("192.168.1.20", "key", FetchRetryPolicy::default(), bridge),
        PersistenceWriter::new(store, StoreRetryPolicy::default()),
        SensorSelector::All,
        iterations,
        Duration::from_secs(60),
    )
}

#[tokio::test(start_paused = true)]
async fn bridge_to_store() {
    let store = Recorder {
        connection_failures: Mutex::new(2),
        ..Recorder::default()
    };
    let mut poll = pipeline(Bridge::answering(&[503, 200, 502]), store, Iterations::Finite(2));
    let (_tx, rx) = watch::channel(false);

    let summary = poll.run(rx).await.unwrap();

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.persisted, 6);

    let lines = poll.writer().store().lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "temperature,id=00:17:88:01:02:00:b5:d1-02-0402,name=Hue\\ temperature\\ sensor\\ 1 value=21.34 1564258371\n\
         presence,id=00:17:88:01:02:00:b5:d1-02-0406,name=Hallway\\ sensor value=true 1564258382\n\
         light,id=00:17:88:01:02:00:b5:d1-02-0400,name=Hue\\ ambient\\ light\\ sensor\\ 1 value=1 1564258360\n"
    );
    assert_eq!(lines[0], lines[1]);
}

#[tokio::test(start_paused = true)]
async fn single_cycle_shapes_records() {
    let mut poll = pipeline(Bridge::answering(&[]), Recorder::default(), Iterations::Finite(1));

    let records = poll.run_cycle().await.unwrap();

    let shaped: Vec<_> = records
        .iter()
        .map(|r| (r.measurement(), r.value(), r.time().to_owned()))
        .collect();
    assert_eq!(
        shaped,
        [
            (
                Measurement::Temperature,
                FieldValue::Float(21.34),
                "2019-07-27T20:12:51".to_owned()
            ),
            (
                Measurement::Presence,
                FieldValue::Boolean(true),
                "2019-07-27T20:13:02".to_owned()
            ),
            (
                Measurement::Light,
                FieldValue::Float(1.0),
                "2019-07-27T20:12:40".to_owned()
            ),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_stops_the_process() {
    let store = Recorder {
        connection_failures: Mutex::new(u32::MAX),
        ..Recorder::default()
    };
    let mut poll = pipeline(Bridge::answering(&[]), store, Iterations::Unbounded);
    let (_tx, rx) = watch::channel(false);

    let err = poll.run(rx).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Persist(PersistError::Exhausted(ref e)) if e.attempts == 6
    ));
}
