//! The CLI front end: wires `cli` argument parsing to `runner`'s load/run
//! phases, installing a `tracing-subscriber::fmt` subscriber — the common
//! pattern for binaries built on a `tracing`-instrumented library, since the
//! library crate itself never installs a subscriber.

use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use shardtrace::cli::{self, Phase};
use shardtrace::config::Config;
use shardtrace::driver::DriverFactory;
use shardtrace::measurements::Measurements;
use shardtrace::testdb::TestDb;
use shardtrace::workload::GraphWorkload;

fn build_factory() -> DriverFactory {
    let mut factory = DriverFactory::new();
    factory.register(
        "test",
        Box::new(|_props: &cli::Properties| -> Result<Box<dyn shardtrace::driver::Driver>> {
            Ok(Box::new(TestDb::new()))
        }),
    );
    factory
}

fn load_config(args: &cli::Args, num_shards: u8) -> Result<Config> {
    let path = args
        .config_file
        .as_ref()
        .ok_or_else(|| anyhow!("-C file is required"))?;
    let file = File::open(path).with_context(|| format!("opening workload-spec file {path}"))?;
    let mut config = Config::from_reader(BufReader::new(file))?;
    config.resize_shard_fields(num_shards)?;
    Ok(config)
}

fn run() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = cli::parse_command_line(std::env::args().skip(1))?;
    let factory = build_factory();
    if !factory.contains(&args.db) {
        return Err(anyhow!("unknown db: {}", args.db));
    }
    let props = cli::resolve_properties(&args)?;
    let measurements = Arc::new(Measurements::new());

    match args.phase {
        Phase::Load => {
            let config = load_config(&args, args.num_shards)?;
            let workload = GraphWorkload::new(config, args.num_shards);
            let result = shardtrace::runner::run_load_phase(
                &factory,
                &args.db,
                &props,
                measurements,
                &workload,
                args.threads,
                args.total_ops,
                args.num_shards,
            )?;
            info!(
                total_keys_target = result.total_keys_target,
                failed_flushes = result.total_failed_flushes,
                "load phase complete"
            );
        }
        Phase::Run => {
            let config = load_config(&args, args.num_shards)?;
            let workload = GraphWorkload::new(config, args.num_shards);
            let experiment_file = args
                .experiment_file
                .as_ref()
                .ok_or_else(|| anyhow!("-E file is required for the run phase"))?;
            let experiments = cli::load_experiments(std::path::Path::new(experiment_file))?;

            let pool = shardtrace::runner::reload_key_pool(
                &factory,
                &args.db,
                &props,
                measurements.clone(),
                args.threads,
                args.num_shards,
            )?;
            info!(loaded_edges = pool.num_loaded_edges(), "reload complete");

            let summaries = shardtrace::runner::run_experiments(
                &factory,
                &args.db,
                &props,
                measurements,
                &workload,
                &pool,
                &experiments,
                !args.spin,
                args.status,
                true,
            )?;
            for (i, summary) in summaries.iter().enumerate() {
                info!(experiment = i, ?summary, "summary");
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
