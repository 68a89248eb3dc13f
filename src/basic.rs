//! Backend that stores nothing. Each call waits out a simulated latency,
//! optionally prints what it was asked to do, and reports success.

use std::fmt::Write as _;
use std::io::{self, Write};

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{
    DataPoint, DataPointWithMetricId, Db, DbResult, FieldSet, Record, TimeUnit, Values,
};
use crate::delay::{CancelSignal, Delay, DelayOutcome};
use crate::properties::Properties;

pub const VERBOSE: &str = "basicdb.verbose";
pub const VERBOSE_DEFAULT: &str = "true";

pub const SIMULATE_DELAY: &str = "basicdb.simulatedelay";
pub const SIMULATE_DELAY_DEFAULT: &str = "0";

pub const RANDOMIZE_DELAY: &str = "basicdb.randomizedelay";
pub const RANDOMIZE_DELAY_DEFAULT: &str = "true";

const BANNER_OPEN: &str = "***************** properties *****************";
const BANNER_CLOSE: &str = "**********************************************";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: `{value}` is not an integer")]
    InvalidInteger { key: &'static str, value: String },
    #[error("basicdb.simulatedelay must not be negative, got {0}")]
    NegativeDelay(i64),
}

/// Resolved settings of one adapter instance.
#[derive(Debug, Clone)]
pub struct BasicDbConfig {
    pub verbose: bool,
    pub delay_millis: u64,
    pub randomize_delay: bool,
    properties: Properties,
}

impl BasicDbConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let verbose = parse_bool(properties.get_or(VERBOSE, VERBOSE_DEFAULT));
        let randomize_delay =
            parse_bool(properties.get_or(RANDOMIZE_DELAY, RANDOMIZE_DELAY_DEFAULT));

        let raw_delay = properties.get_or(SIMULATE_DELAY, SIMULATE_DELAY_DEFAULT);
        let delay: i64 = raw_delay
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidInteger {
                key: SIMULATE_DELAY,
                value: raw_delay.to_string(),
            })?;
        let delay_millis = u64::try_from(delay).map_err(|_| ConfigError::NegativeDelay(delay))?;

        Ok(Self {
            verbose,
            delay_millis,
            randomize_delay,
            properties: properties.clone(),
        })
    }

    /// The full property table this configuration was resolved from.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Anything other than a case-insensitive `true` reads as `false`.
fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

pub struct BasicDb {
    config: BasicDbConfig,
    delay: Delay,
    cancel: CancelSignal,
    trace: Box<dyn Write + Send>,
}

impl BasicDb {
    pub fn new(config: BasicDbConfig, cancel: CancelSignal) -> Self {
        let delay = Delay::new(config.delay_millis, config.randomize_delay);
        Self {
            config,
            delay,
            cancel,
            trace: Box::new(io::stdout()),
        }
    }

    /// Send trace lines somewhere other than stdout.
    pub fn with_trace_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.trace = Box::new(sink);
        self
    }

    /// Make randomized delays reproducible.
    pub fn with_delay_seed(mut self, seed: u64) -> Self {
        self.delay = Delay::with_seed(self.config.delay_millis, self.config.randomize_delay, seed);
        self
    }

    pub fn config(&self) -> &BasicDbConfig {
        &self.config
    }

    async fn simulate_delay(&mut self) {
        if self.delay.apply(&self.cancel).await == DelayOutcome::Cancelled {
            tracing::debug!("simulated delay cut short by cancellation");
        }
    }

    /// Write one trace line. `line` only runs when verbose.
    fn trace(&mut self, line: impl FnOnce() -> String) {
        if !self.config.verbose {
            return;
        }
        if let Err(e) = writeln!(self.trace, "{}", line()) {
            tracing::warn!("failed to write trace line: {e}");
        }
    }
}

fn field_list(fields: &FieldSet) -> String {
    let mut out = String::from("[ ");
    match fields {
        FieldSet::All => out.push_str("<all fields> "),
        FieldSet::Only(names) => {
            for name in names {
                let _ = write!(out, "{name} ");
            }
        }
    }
    out.push(']');
    out
}

fn value_list(values: &Values) -> String {
    let mut out = String::from("[ ");
    for (field, value) in values {
        let _ = write!(out, "{field}={} ", String::from_utf8_lossy(value));
    }
    out.push(']');
    out
}

fn point_list(points: &[DataPointWithMetricId]) -> String {
    let joined = points
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

#[async_trait]
impl Db for BasicDb {
    async fn init(&mut self) -> DbResult<()> {
        tracing::info!(
            verbose = self.config.verbose,
            delay_millis = self.config.delay_millis,
            randomize_delay = self.config.randomize_delay,
            "basicdb initialised"
        );
        if self.config.verbose {
            let mut dump = String::from(BANNER_OPEN);
            for (key, value) in self.config.properties.iter() {
                let _ = write!(dump, "\n\"{key}\"=\"{value}\"");
            }
            dump.push('\n');
            dump.push_str(BANNER_CLOSE);
            self.trace(|| dump);
        }
        Ok(())
    }

    async fn read(&mut self, table: &str, key: &str, fields: &FieldSet) -> DbResult<Record> {
        self.simulate_delay().await;
        self.trace(|| format!("READ {table} {key} {}", field_list(fields)));
        Ok(Record::new())
    }

    async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: &FieldSet,
    ) -> DbResult<Vec<Record>> {
        self.simulate_delay().await;
        self.trace(|| format!("SCAN {table} {start_key} {count} {}", field_list(fields)));
        Ok(Vec::new())
    }

    async fn update(&mut self, table: &str, key: &str, values: &Values) -> DbResult<()> {
        self.simulate_delay().await;
        self.trace(|| format!("UPDATE {table} {key} {}", value_list(values)));
        Ok(())
    }

    async fn insert(&mut self, table: &str, key: &str, values: &Values) -> DbResult<()> {
        self.simulate_delay().await;
        self.trace(|| format!("INSERT {table} {key} {}", value_list(values)));
        Ok(())
    }

    async fn delete(&mut self, table: &str, key: &str) -> DbResult<()> {
        self.simulate_delay().await;
        self.trace(|| format!("DELETE {table} {key}"));
        Ok(())
    }

    async fn insert_datapoints(
        &mut self,
        table: &str,
        measurement: &str,
        _time_unit: TimeUnit,
        points: &[DataPointWithMetricId],
    ) -> DbResult<()> {
        self.simulate_delay().await;
        self.trace(|| {
            format!(
                "INSERT datapoints {table} {measurement} {}",
                point_list(points)
            )
        });
        Ok(())
    }

    async fn scan_datapoints(
        &mut self,
        table: &str,
        key: &str,
        field: &str,
        start: i64,
        end: i64,
        _time_unit: TimeUnit,
    ) -> DbResult<Vec<DataPoint>> {
        self.simulate_delay().await;
        self.trace(|| {
            format!("SCAN datapoints {table} {key} {field} from {start} to {end}")
        });
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Status;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use test_case::test_case;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn props(pairs: &[(&str, &str)]) -> Properties {
        let mut props = Properties::new();
        for (k, v) in pairs {
            props.set(*k, *v);
        }
        props
    }

    fn traced_db(pairs: &[(&str, &str)]) -> (BasicDb, SharedBuffer) {
        let config = BasicDbConfig::from_properties(&props(pairs)).unwrap();
        let buffer = SharedBuffer::default();
        let db = BasicDb::new(config, CancelSignal::new()).with_trace_sink(buffer.clone());
        (db, buffer)
    }

    fn values(pairs: &[(&str, &str)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Bytes::copy_from_slice(v.as_bytes())))
            .collect()
    }

    #[test]
    fn defaults_when_keys_absent() {
        let config = BasicDbConfig::from_properties(&Properties::new()).unwrap();
        assert!(config.verbose);
        assert_eq!(config.delay_millis, 0);
        assert!(config.randomize_delay);
    }

    #[test]
    fn explicit_values_are_used() {
        let config = BasicDbConfig::from_properties(&props(&[
            (VERBOSE, "FALSE"),
            (SIMULATE_DELAY, " 15 "),
            (RANDOMIZE_DELAY, "false"),
        ]))
        .unwrap();
        assert!(!config.verbose);
        assert_eq!(config.delay_millis, 15);
        assert!(!config.randomize_delay);
    }

    #[test_case("yes" => false; "yes")]
    #[test_case("1" => false; "one")]
    #[test_case("" => false; "empty")]
    #[test_case("TRUE" => true; "upper true")]
    #[test_case(" true " => true; "padded true")]
    fn non_true_booleans_read_as_false(raw: &str) -> bool {
        let config = BasicDbConfig::from_properties(&props(&[
            (VERBOSE, raw),
            (RANDOMIZE_DELAY, raw),
        ]))
        .unwrap();
        assert_eq!(config.verbose, config.randomize_delay);
        config.verbose
    }

    #[test_case(&[(SIMULATE_DELAY, "ten")] => ConfigError::InvalidInteger {
        key: SIMULATE_DELAY,
        value: "ten".into(),
    }; "bad delay")]
    #[test_case(&[(SIMULATE_DELAY, "-3")] => ConfigError::NegativeDelay(-3); "negative delay")]
    fn rejects_malformed_delay(pairs: &[(&str, &str)]) -> ConfigError {
        BasicDbConfig::from_properties(&props(pairs)).unwrap_err()
    }

    #[tokio::test]
    async fn read_traces_named_fields() {
        let (mut db, buffer) = traced_db(&[]);
        let result = db.read("users", "u1", &FieldSet::only(["name"])).await;
        assert_eq!(Status::from(&result).code(), 0);
        assert!(result.unwrap().is_empty());
        assert!(buffer.contents().contains("READ users u1 [ name ]"));
    }

    #[tokio::test]
    async fn read_traces_all_fields_marker() {
        let (mut db, buffer) = traced_db(&[]);
        db.read("users", "u1", &FieldSet::All).await.unwrap();
        let out = buffer.contents();
        assert!(out.contains("READ users u1 [ <all fields> ]"), "{out}");
        assert!(!out.contains("name"));
    }

    #[tokio::test]
    async fn scan_is_always_empty() {
        let (mut db, buffer) = traced_db(&[]);
        for count in [0, 1, 100] {
            let rows = db
                .scan("users", "u1", count, &FieldSet::only(["a", "b"]))
                .await
                .unwrap();
            assert!(rows.is_empty());
        }
        assert!(buffer.contents().contains("SCAN users u1 100 [ a b ]"));
    }

    #[tokio::test]
    async fn writes_trace_field_value_pairs() {
        let (mut db, buffer) = traced_db(&[]);
        let result = db.update("users", "u1", &values(&[("name", "Bob")])).await;
        assert_eq!(Status::from(&result).code(), 0);
        db.insert("users", "u2", &values(&[("age", "7"), ("name", "Al")]))
            .await
            .unwrap();
        db.delete("users", "u3").await.unwrap();

        let out = buffer.contents();
        assert!(out.contains("UPDATE users u1 [ name=Bob ]"), "{out}");
        assert!(out.contains("INSERT users u2 [ age=7 name=Al ]"), "{out}");
        assert!(out.contains("DELETE users u3"), "{out}");
    }

    #[tokio::test]
    async fn datapoint_operations_trace_and_return_nothing() {
        let (mut db, buffer) = traced_db(&[]);
        let points = [
            DataPointWithMetricId {
                metric_id: 1,
                timestamp: 10,
                value: 0.5,
            },
            DataPointWithMetricId {
                metric_id: 2,
                timestamp: 11,
                value: 2.0,
            },
        ];
        db.insert_datapoints("metrics", "cpu", TimeUnit::Milliseconds, &points)
            .await
            .unwrap();
        let found = db
            .scan_datapoints("metrics", "host1", "load", 0, 99, TimeUnit::Seconds)
            .await
            .unwrap();
        assert!(found.is_empty());

        let out = buffer.contents();
        assert!(out.contains("INSERT datapoints metrics cpu [1@10=0.5, 2@11=2]"), "{out}");
        assert!(out.contains("SCAN datapoints metrics host1 load from 0 to 99"), "{out}");
    }

    #[tokio::test]
    async fn quiet_instance_writes_nothing() {
        let (mut db, buffer) = traced_db(&[(VERBOSE, "false")]);
        db.init().await.unwrap();
        db.read("users", "u1", &FieldSet::All).await.unwrap();
        db.delete("users", "u1").await.unwrap();
        assert!(buffer.contents().is_empty());
    }

    #[tokio::test]
    async fn init_dumps_properties_and_is_repeatable() {
        let (mut db, buffer) = traced_db(&[("recordcount", "10"), (SIMULATE_DELAY, "0")]);
        db.init().await.unwrap();
        db.init().await.unwrap();
        let out = buffer.contents();
        assert_eq!(out.matches(BANNER_OPEN).count(), 2);
        assert!(out.contains("\"recordcount\"=\"10\""));
        assert!(out.contains("\"basicdb.simulatedelay\"=\"0\""));
    }

    #[tokio::test]
    async fn broken_trace_sink_is_not_an_error() {
        let config = BasicDbConfig::from_properties(&Properties::new()).unwrap();
        let mut db = BasicDb::new(config, CancelSignal::new()).with_trace_sink(BrokenSink);
        assert!(db.read("t", "k", &FieldSet::All).await.is_ok());
    }

    #[tokio::test]
    async fn zero_delay_returns_promptly() {
        let (mut db, _) = traced_db(&[(VERBOSE, "false")]);
        let start = Instant::now();
        for _ in 0..1_000 {
            db.delete("t", "k").await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[derive(Debug, Clone, Copy)]
    enum Call {
        Read,
        Scan,
        Update,
        Insert,
        Delete,
        InsertDatapoints,
        ScanDatapoints,
    }

    async fn issue(db: &mut BasicDb, call: Call) -> Status {
        match call {
            Call::Read => Status::from(&db.read("t", "k", &FieldSet::All).await),
            Call::Scan => Status::from(&db.scan("t", "k", 10, &FieldSet::All).await),
            Call::Update => Status::from(&db.update("t", "k", &Values::new()).await),
            Call::Insert => Status::from(&db.insert("t", "k", &Values::new()).await),
            Call::Delete => Status::from(&db.delete("t", "k").await),
            Call::InsertDatapoints => Status::from(
                &db.insert_datapoints("t", "m", TimeUnit::Milliseconds, &[])
                    .await,
            ),
            Call::ScanDatapoints => Status::from(
                &db.scan_datapoints("t", "k", "f", 0, 10, TimeUnit::Milliseconds)
                    .await,
            ),
        }
    }

    #[test_case(Call::Read; "read")]
    #[test_case(Call::Scan; "scan")]
    #[test_case(Call::Update; "update")]
    #[test_case(Call::Insert; "insert")]
    #[test_case(Call::Delete; "delete")]
    #[test_case(Call::InsertDatapoints; "insert datapoints")]
    #[test_case(Call::ScanDatapoints; "scan datapoints")]
    #[tokio::test]
    async fn every_operation_waits_exactly_once(call: Call) {
        let (mut db, _) = traced_db(&[
            (VERBOSE, "false"),
            (SIMULATE_DELAY, "20"),
            (RANDOMIZE_DELAY, "false"),
        ]);
        let start = Instant::now();
        assert_eq!(issue(&mut db, call).await, Status::Ok);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(20), "{call:?} took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(40), "{call:?} took {elapsed:?}");
    }

    #[test]
    fn quiet_instance_skips_formatting() {
        let (mut db, buffer) = traced_db(&[(VERBOSE, "false")]);
        db.trace(|| unreachable!("trace line built while quiet"));
        assert!(buffer.contents().is_empty());
    }

    #[tokio::test]
    async fn randomized_delay_stays_below_window() {
        let (db, _) = traced_db(&[
            (VERBOSE, "false"),
            (SIMULATE_DELAY, "10"),
            (RANDOMIZE_DELAY, "true"),
        ]);
        let mut db = db.with_delay_seed(3);
        for _ in 0..20 {
            let start = Instant::now();
            db.read("t", "k", &FieldSet::All).await.unwrap();
            assert!(start.elapsed() < Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn cancelled_delay_still_succeeds() {
        let config = BasicDbConfig::from_properties(&props(&[
            (VERBOSE, "false"),
            (SIMULATE_DELAY, "10000"),
            (RANDOMIZE_DELAY, "false"),
        ]))
        .unwrap();
        let cancel = CancelSignal::new();
        let mut db = BasicDb::new(config, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = db.read("t", "k", &FieldSet::All).await;
        assert_eq!(Status::from(&result).code(), 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
