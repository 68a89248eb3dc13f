mod args;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use basicdb::db::{Db, Status, TimeUnit};
use basicdb::delay::CancelSignal;
use basicdb::metrics::ConcurrentMetrics;
use basicdb::properties::Properties;
use basicdb::workload::{Operation, OperationGenerator, WorkloadConfig};

use crate::args::Args;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "basicdb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let properties = args.load_properties().context("failed to load properties")?;
    let runtime = configure_runtime(&args)?;
    let config = create_workload_config(&args);

    runtime.block_on(run_bench(&args, config, properties))
}

fn configure_runtime(args: &Args) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if let Some(workers) = args.worker_threads {
        builder.worker_threads(workers.max(1));
    }

    if let Some(stack_size) = args.thread_stack_size {
        builder.thread_stack_size(stack_size);
    }

    if let Some(max_threads) = args.max_blocking_threads {
        builder.max_blocking_threads(max_threads);
    }

    builder.build().context("failed to build tokio runtime")
}

fn create_workload_config(args: &Args) -> WorkloadConfig {
    WorkloadConfig {
        workload: args.workload,
        table: args.table.clone(),
        record_count: args.record_count,
        operation_count: args.operation_count,
        field_count: args.field_count,
        field_length: args.field_length,
        range_size: args.range_size,
    }
}

async fn run_bench(args: &Args, config: WorkloadConfig, properties: Properties) -> Result<()> {
    let cancel = CancelSignal::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cutting simulated delays short");
            interrupt.cancel();
        }
    });

    let num_clients = args
        .num_clients
        .unwrap_or_else(|| num_cpus::get() as u32)
        .max(1);
    println!(
        "Starting {} against {:?} with {} concurrent clients...",
        config.workload, args.database, num_clients
    );

    let metrics = ConcurrentMetrics::default();
    let started = Instant::now();
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let db = args.database.create(&properties, &cancel)?;
        let generator = OperationGenerator::new(config.clone(), client_id)?;
        let metrics = metrics.clone();
        let cancel = cancel.clone();
        let plan = ClientPlan::new(client_id, num_clients, !args.skip_load);

        handles.push(task::spawn(async move {
            run_client(db, generator, plan, metrics, cancel).await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let results = metrics.get_metrics().await;
    println!("\nBenchmark Complete");
    println!("Total Operations: {}", results.total_operations());
    println!("Elapsed: {:.2} s", started.elapsed().as_secs_f64());
    println!("{}", results);

    if args.json_summary {
        println!("{}", serde_json::to_string_pretty(&results.summary())?);
    }

    Ok(())
}

/// Share of the load and run phases assigned to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClientPlan {
    client_id: u32,
    num_clients: u32,
    load: bool,
}

impl ClientPlan {
    fn new(client_id: u32, num_clients: u32, load: bool) -> Self {
        Self {
            client_id,
            num_clients,
            load,
        }
    }

    /// Record indices this client loads: every `num_clients`-th, offset by id.
    fn load_indices(&self, record_count: u32) -> impl Iterator<Item = u32> {
        let (id, step) = (self.client_id, self.num_clients as usize);
        let load = self.load;
        (id..record_count).step_by(step).filter(move |_| load)
    }

    /// Operations for this client; the first clients absorb the remainder.
    fn operations(&self, operation_count: u32) -> u32 {
        let base = operation_count / self.num_clients;
        let extra = u32::from(self.client_id < operation_count % self.num_clients);
        base + extra
    }
}

async fn run_client(
    mut db: Box<dyn Db>,
    mut generator: OperationGenerator,
    plan: ClientPlan,
    metrics: ConcurrentMetrics,
    cancel: CancelSignal,
) -> Result<()> {
    db.init().await.context("backend init failed")?;

    let table = generator.table().to_string();
    for index in plan.load_indices(generator.config().record_count) {
        if cancel.is_cancelled() {
            break;
        }
        let key = format!("user{}", index);
        let values = generator.next_values();
        let start = Instant::now();
        let result = db.insert(&table, &key, &values).await;
        metrics
            .record(Operation::Insert, start.elapsed(), Status::from(&result))
            .await;
    }

    let ops = plan.operations(generator.config().operation_count);
    tracing::debug!(client = plan.client_id, ops, "starting run phase");

    for i in 0..ops {
        if cancel.is_cancelled() {
            tracing::info!(client = plan.client_id, completed = i, "client stopped early");
            break;
        }
        if i > 0 && i % 1000 == 0 {
            println!(
                "Client {} progress: {}/{} ({:.1}%)",
                plan.client_id,
                i,
                ops,
                (i as f64 / ops as f64) * 100.0
            );
        }

        let operation = generator.next_operation();
        execute_operation(db.as_mut(), &mut generator, operation, &metrics).await;
    }

    db.cleanup().await.context("backend cleanup failed")?;
    Ok(())
}

async fn execute_operation(
    db: &mut dyn Db,
    generator: &mut OperationGenerator,
    operation: Operation,
    metrics: &ConcurrentMetrics,
) {
    let table = generator.table().to_string();
    let fields = generator.read_fields();
    let start = Instant::now();

    let status = match operation {
        Operation::Read => {
            let key = generator.next_key();
            Status::from(&db.read(&table, &key, &fields).await)
        }
        Operation::Update => {
            let key = generator.next_key();
            let values = generator.next_values();
            Status::from(&db.update(&table, &key, &values).await)
        }
        Operation::Insert => {
            let key = generator.next_insert_key();
            let values = generator.next_values();
            Status::from(&db.insert(&table, &key, &values).await)
        }
        Operation::Scan => {
            let key = generator.next_key();
            let count = generator.scan_length();
            Status::from(&db.scan(&table, &key, count, &fields).await)
        }
        Operation::ReadModifyWrite => {
            let key = generator.next_key();
            let values = generator.next_values();
            match db.read(&table, &key, &fields).await {
                Ok(_) => Status::from(&db.update(&table, &key, &values).await),
                Err(_) => Status::Error,
            }
        }
        Operation::Delete => {
            let key = generator.next_key();
            Status::from(&db.delete(&table, &key).await)
        }
        Operation::InsertDatapoints => {
            let points = generator.next_datapoints();
            Status::from(
                &db.insert_datapoints(&table, "measurement", TimeUnit::Milliseconds, &points)
                    .await,
            )
        }
        Operation::ScanDatapoints => {
            let key = generator.next_key();
            let (from, to) = generator.next_time_range();
            Status::from(
                &db.scan_datapoints(&table, &key, "value", from, to, TimeUnit::Milliseconds)
                    .await,
            )
        }
    };

    metrics.record(operation, start.elapsed(), status).await;
}
