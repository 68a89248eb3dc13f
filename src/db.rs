use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Field name to opaque value mapping used by writes.
pub type Values = BTreeMap<String, Bytes>;

/// One record handed back by reads and scans.
pub type Record = BTreeMap<String, Bytes>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("operation failed: {0}")]
    GenericFailure(String),
}

/// Numeric status reported to the driver for a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

impl<T> From<&DbResult<T>> for Status {
    fn from(result: &DbResult<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(_) => Status::Error,
        }
    }
}

/// Which fields a read or scan asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSet {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl FieldSet {
    pub fn only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet::Only(fields.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

/// A single time-series sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// A time-series sample tagged with the metric it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPointWithMetricId {
    pub metric_id: u64,
    pub timestamp: i64,
    pub value: f64,
}

impl Display for DataPointWithMetricId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}={}", self.metric_id, self.timestamp, self.value)
    }
}

/// Operation contract every backend adapter implements. The driver owns one
/// instance per worker and calls `init` once before issuing operations.
#[async_trait]
pub trait Db: Send + 'static {
    /// One-time setup for this instance. Safe to call more than once.
    async fn init(&mut self) -> DbResult<()>;

    /// Tear down per-instance state once the worker is finished.
    async fn cleanup(&mut self) -> DbResult<()> {
        Ok(())
    }

    /// Read a single record by key
    async fn read(&mut self, table: &str, key: &str, fields: &FieldSet) -> DbResult<Record>;

    /// Read at most `count` records starting at `start_key`
    async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: &FieldSet,
    ) -> DbResult<Vec<Record>>;

    /// Overwrite the given fields of an existing record
    async fn update(&mut self, table: &str, key: &str, values: &Values) -> DbResult<()>;

    /// Insert a new record
    async fn insert(&mut self, table: &str, key: &str, values: &Values) -> DbResult<()>;

    /// Delete a record
    async fn delete(&mut self, table: &str, key: &str) -> DbResult<()>;

    /// Append a batch of time-series samples to a measurement
    async fn insert_datapoints(
        &mut self,
        table: &str,
        measurement: &str,
        time_unit: TimeUnit,
        points: &[DataPointWithMetricId],
    ) -> DbResult<()>;

    /// Query the samples of `key`/`field` in `[start, end]`
    async fn scan_datapoints(
        &mut self,
        table: &str,
        key: &str,
        field: &str,
        start: i64,
        end: i64,
        time_unit: TimeUnit,
    ) -> DbResult<Vec<DataPoint>>;
}
