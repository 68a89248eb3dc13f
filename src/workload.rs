use std::fmt::{Display, Formatter};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::ValueEnum;
use rand::distributions::{Alphanumeric, Distribution, Uniform};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Zipf;
use serde::Serialize;

use crate::db::{DataPointWithMetricId, FieldSet, Values};

/// Skew of the request key distribution.
const ZIPFIAN_CONSTANT: f64 = 0.99;

/// Samples per `insert_datapoints` batch.
const DATAPOINT_BATCH: usize = 10;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadType {
    A, // 50% read, 50% update
    B, // 95% read, 5% update
    C, // 100% read
    D, // 95% read, 5% insert
    E, // 95% scan, 5% insert
    F, // 50% read, 50% read-modify-write
    Timeseries, // 50% datapoint insert, 50% datapoint scan
}

impl Display for WorkloadType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkloadType::A => "Workload A",
            WorkloadType::B => "Workload B",
            WorkloadType::C => "Workload C",
            WorkloadType::D => "Workload D",
            WorkloadType::E => "Workload E",
            WorkloadType::F => "Workload F",
            WorkloadType::Timeseries => "Timeseries",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Operation {
    Read,
    Update,
    Insert,
    Scan,
    ReadModifyWrite,
    Delete,
    InsertDatapoints,
    ScanDatapoints,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Read => "Reads",
            Operation::Update => "Updates",
            Operation::Insert => "Inserts",
            Operation::Scan => "Scans",
            Operation::ReadModifyWrite => "Read-Modify",
            Operation::Delete => "Deletes",
            Operation::InsertDatapoints => "TS Inserts",
            Operation::ScanDatapoints => "TS Scans",
        }
    }
}

/// Relative weight of each operation in a workload.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMix {
    pub weights: Vec<(Operation, f64)>,
}

impl OperationMix {
    pub fn for_workload(workload: WorkloadType) -> Self {
        use Operation::*;
        let weights = match workload {
            WorkloadType::A => vec![(Read, 0.5), (Update, 0.5)],
            WorkloadType::B => vec![(Read, 0.95), (Update, 0.05)],
            WorkloadType::C => vec![(Read, 1.0)],
            WorkloadType::D => vec![(Read, 0.95), (Insert, 0.05)],
            WorkloadType::E => vec![(Scan, 0.95), (Insert, 0.05)],
            WorkloadType::F => vec![(Read, 0.5), (ReadModifyWrite, 0.5)],
            WorkloadType::Timeseries => vec![(InsertDatapoints, 0.5), (ScanDatapoints, 0.5)],
        };
        Self { weights }
    }

    /// Map a uniform draw in `[0, 1)` onto an operation.
    fn pick(&self, draw: f64) -> Operation {
        let total: f64 = self.weights.iter().map(|(_, w)| w).sum();
        let mut point = draw * total;
        for (operation, weight) in &self.weights {
            if point < *weight {
                return *operation;
            }
            point -= weight;
        }
        self.weights
            .last()
            .map(|(operation, _)| *operation)
            .unwrap_or(Operation::Read)
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub workload: WorkloadType,
    pub table: String,
    pub record_count: u32,
    pub operation_count: u32,
    pub field_count: u32,
    pub field_length: usize,
    pub range_size: u32, // upper bound for scan lengths
}

/// Per-client request generator. Each client owns one, so no random source
/// is shared between tasks.
pub struct OperationGenerator {
    config: WorkloadConfig,
    mix: OperationMix,
    key_chooser: Zipf<f64>,
    scan_length: Uniform<u32>,
    rng: SmallRng,
    client_id: u32,
    inserted: u64,
}

impl OperationGenerator {
    pub fn new(config: WorkloadConfig, client_id: u32) -> Result<Self> {
        Self::with_rng(config, client_id, SmallRng::from_entropy())
    }

    pub fn with_seed(config: WorkloadConfig, client_id: u32, seed: u64) -> Result<Self> {
        Self::with_rng(config, client_id, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: WorkloadConfig, client_id: u32, rng: SmallRng) -> Result<Self> {
        let key_chooser = Zipf::new(u64::from(config.record_count.max(1)), ZIPFIAN_CONSTANT)
            .context("invalid zipfian key distribution")?;
        let scan_length = Uniform::new_inclusive(1, config.range_size.max(1));
        Ok(Self {
            mix: OperationMix::for_workload(config.workload),
            config,
            key_chooser,
            scan_length,
            rng,
            client_id,
            inserted: 0,
        })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn next_operation(&mut self) -> Operation {
        let draw = self.rng.gen::<f64>();
        self.mix.pick(draw)
    }

    /// Key of an existing record, skewed towards the low end of the key space.
    pub fn next_key(&mut self) -> String {
        let rank = self.key_chooser.sample(&mut self.rng) as u64;
        format!("user{}", rank.saturating_sub(1))
    }

    /// Fresh key beyond the loaded range, unique per client.
    pub fn next_insert_key(&mut self) -> String {
        self.inserted += 1;
        format!(
            "user{}_{}_{}",
            self.config.record_count, self.client_id, self.inserted
        )
    }

    pub fn scan_length(&mut self) -> usize {
        self.scan_length.sample(&mut self.rng) as usize
    }

    pub fn read_fields(&self) -> FieldSet {
        FieldSet::All
    }

    pub fn next_values(&mut self) -> Values {
        (0..self.config.field_count)
            .map(|i| {
                let value: String = (&mut self.rng)
                    .sample_iter(&Alphanumeric)
                    .take(self.config.field_length)
                    .map(char::from)
                    .collect();
                (format!("field{i}"), Bytes::from(value))
            })
            .collect()
    }

    /// A batch of samples stamped with the current wall-clock time.
    pub fn next_datapoints(&mut self) -> Vec<DataPointWithMetricId> {
        let now = chrono::Utc::now().timestamp_millis();
        (0..DATAPOINT_BATCH)
            .map(|i| DataPointWithMetricId {
                metric_id: self.rng.gen_range(0..u64::from(self.config.field_count.max(1))),
                timestamp: now + i as i64,
                value: self.rng.gen::<f64>() * 100.0,
            })
            .collect()
    }

    /// `[start, end]` window in milliseconds ending now.
    pub fn next_time_range(&mut self) -> (i64, i64) {
        let end = chrono::Utc::now().timestamp_millis();
        let span = self.rng.gen_range(1_000..=60_000);
        (end - span, end)
    }
}
