use std::path::PathBuf;

use clap::Parser;

use basicdb::database::Database;
use basicdb::properties::{Properties, PropertiesError};
use basicdb::workload::WorkloadType;

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub struct Args {
    /// The backend to run against
    #[arg(short, long, default_value = "basic")]
    pub database: Database,

    /// Workload type
    #[arg(long, default_value = "a")]
    pub workload: WorkloadType,

    /// Number of records to load initially
    #[arg(long, default_value = "1000")]
    pub record_count: u32,

    /// Number of operations to perform across all clients
    #[arg(long, default_value = "1000")]
    pub operation_count: u32,

    /// Number of concurrent clients (defaults to the CPU count)
    #[arg(long)]
    pub num_clients: Option<u32>,

    /// Table name passed to every operation
    #[arg(long, default_value = "usertable")]
    pub table: String,

    /// Fields per record
    #[arg(long, default_value = "10")]
    pub field_count: u32,

    /// Length of each generated field value
    #[arg(long, default_value = "100")]
    pub field_length: usize,

    /// Maximum number of records per scan
    #[arg(long, default_value = "100")]
    pub range_size: u32,

    /// Skip the initial load phase
    #[arg(long)]
    pub skip_load: bool,

    /// Property file handed to the backend (repeatable, later files win)
    #[arg(short = 'P', long = "property-file")]
    pub property_files: Vec<PathBuf>,

    /// Single `key=value` property, overrides property files
    #[arg(short = 'p', long = "property", value_parser = Properties::parse_override)]
    pub properties: Vec<(String, String)>,

    /// Also print the latency summary as JSON
    #[arg(long)]
    pub json_summary: bool,

    /// Tokio worker threads
    #[arg(long)]
    pub worker_threads: Option<usize>,

    /// Stack size for runtime threads
    #[arg(long)]
    pub thread_stack_size: Option<usize>,

    /// Cap on blocking threads
    #[arg(long)]
    pub max_blocking_threads: Option<usize>,
}

impl Args {
    /// Property files in order, then `-p` overrides.
    pub fn load_properties(&self) -> Result<Properties, PropertiesError> {
        let mut properties = Properties::new();
        for path in &self.property_files {
            properties.merge(Properties::from_file(path)?);
        }
        for (key, value) in &self.properties {
            properties.set(key.clone(), value.clone());
        }
        Ok(properties)
    }
}
