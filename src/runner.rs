//! Sequences the load and run phases, and the sequential experiments within
//! the run phase.
//!
//! Worker/loader fan-out uses `std::thread::scope`, letting spawned threads
//! borrow the shared `Workload`/`KeyPool`/`Measurements` without requiring
//! `'static` or `Arc` wrapping of everything.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use tracing::info;

use crate::cli::{ExperimentInfo, Properties};
use crate::constants::{
    INTER_EXPERIMENT_GAP_SECONDS, PRE_RUN_QUIESCE_SECONDS, RESULTS_DIR, STATUS_INTERVAL_SECONDS_DEFAULT,
    WARMUP_PERIOD_SECONDS_DEFAULT,
};
use crate::driver::DriverFactory;
use crate::keypool::KeyPool;
use crate::loader::Loader;
use crate::measurements::Measurements;
use crate::worker::{run_worker, CountDownLatch};
use crate::workload::{GraphWorkload, Workload};

/// Outcome of the load phase: the target the harness computed and how many
/// buffer flushes failed along the way (logged but not fatal).
#[derive(Debug, Clone, Copy)]
pub struct LoadPhaseResult {
    pub total_keys_target: u64,
    pub total_failed_flushes: u64,
}

/// Load phase: construct `num_threads` drivers and per-thread loaders, each
/// generating an equal share of `workload.num_keys_to_generate(total_ops)`
/// rows (the last thread absorbs the remainder), then flush.
pub fn run_load_phase(
    factory: &DriverFactory,
    db_name: &str,
    props: &Properties,
    measurements: Arc<Measurements>,
    workload: &GraphWorkload,
    num_threads: usize,
    total_ops: u64,
    num_shards: u8,
) -> Result<LoadPhaseResult> {
    let total_keys = workload.num_keys_to_generate(total_ops)?;
    let per_thread = total_keys / num_threads as u64;
    let remainder = total_keys % num_threads as u64;

    let total_failed = AtomicU64::new(0);

    thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for i in 0..num_threads {
            let quota = per_thread + if i + 1 == num_threads { remainder } else { 0 };
            let total_failed = &total_failed;
            let measurements = measurements.clone();
            handles.push(scope.spawn(move || -> Result<()> {
                let driver = factory
                    .create(db_name, props, measurements)
                    .ok_or_else(|| anyhow!("unknown driver: {db_name}"))??;
                driver.init().context("driver init during load phase")?;

                let mut loader = Loader::new(&driver, num_shards as usize);
                let mut failed = 0u64;
                for _ in 0..quota {
                    failed += workload.load_row(&mut loader)?;
                }
                if !loader.flush_edge_buffer() {
                    failed += 1;
                }
                if !loader.flush_object_buffer() {
                    failed += 1;
                }
                total_failed.fetch_add(failed, Ordering::Relaxed);
                driver.cleanup().context("driver cleanup during load phase")
            }));
        }
        for handle in handles {
            handle.join().map_err(|_| anyhow!("load phase worker thread panicked"))??;
        }
        Ok(())
    })?;

    Ok(LoadPhaseResult {
        total_keys_target: total_keys,
        total_failed_flushes: total_failed.load(Ordering::Relaxed),
    })
}

/// Splits `[0, num_shards)` into `num_threads` contiguous, non-overlapping
/// shard-id ranges expressed as `(floor_key, ceiling_key)` string bounds,
/// matching `Loader::reload_from_db`'s half-open-interval contract.
///
/// Bounds are zero-padded to [`crate::constants::SHARD_KEY_WIDTH`] digits,
/// matching `Workload::generate_key`'s padding, so plain lexicographic
/// string comparison agrees with numeric shard order. The floor for a
/// non-leading range uses a `~` sentinel after the previous range's top
/// shard prefix so that shard's own keys (any alphanumeric tag) compare
/// less than the floor, excluding them from this range.
fn shard_ranges(num_shards: u8, num_threads: usize) -> Vec<(String, String)> {
    let num_threads = num_threads.max(1);
    const WIDTH: usize = crate::constants::SHARD_KEY_WIDTH;
    (0..num_threads)
        .map(|i| {
            let lo = i * num_shards as usize / num_threads;
            let hi = (i + 1) * num_shards as usize / num_threads;
            let floor = if lo == 0 {
                String::new()
            } else {
                format!("{:0w$}:~", lo - 1, w = WIDTH)
            };
            let ceiling = format!("{:0w$}:", hi, w = WIDTH);
            (floor, ceiling)
        })
        .collect()
}

/// Reload: construct `num_threads` drivers solely for reload, partition
/// shard space into contiguous ranges, reload each via
/// `Loader::reload_from_db`, and merge the loaders' key-pool slices into one
/// frozen [`KeyPool`].
pub fn reload_key_pool(
    factory: &DriverFactory,
    db_name: &str,
    props: &Properties,
    measurements: Arc<Measurements>,
    num_threads: usize,
    num_shards: u8,
) -> Result<KeyPool> {
    let ranges = shard_ranges(num_shards, num_threads);

    thread::scope(|scope| -> Result<KeyPool> {
        let mut handles = Vec::new();
        for (floor, ceiling) in ranges {
            let measurements = measurements.clone();
            handles.push(scope.spawn(move || -> Result<Vec<Vec<crate::edge::Edge>>> {
                let driver = factory
                    .create(db_name, props, measurements)
                    .ok_or_else(|| anyhow!("unknown driver: {db_name}"))??;
                driver.init().context("driver init during reload")?;
                let mut loader = Loader::new(&driver, num_shards as usize);
                loader.reload_from_db(&floor, &ceiling)?;
                driver.cleanup().context("driver cleanup during reload")?;
                Ok(loader.into_shards())
            }));
        }
        let mut parts = Vec::new();
        for handle in handles {
            parts.push(handle.join().map_err(|_| anyhow!("reload worker thread panicked"))??);
        }
        Ok(KeyPool::merge(num_shards as usize, parts))
    })
}

/// Summary printed to stdout at the end of each experiment.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentSummary {
    pub total_runtime: Duration,
    pub total_ops: u64,
    pub overtime_ops: u64,
    pub failed_ops: u64,
    /// Wall time since the warmup-triggered reset (or since experiment start,
    /// if the experiment ended before the warmup period elapsed).
    pub warmup_excluded_runtime: Duration,
    /// `Measurements::total_num_ops()` as of experiment end: ops reported
    /// since whichever reset happened last (the warmup reset, or the
    /// experiment-start reset if warmup never elapsed).
    pub warmup_excluded_ops: u64,
}

impl ExperimentSummary {
    /// `total_ops` divided by `total_runtime`.
    pub fn overall_throughput(&self) -> f64 {
        self.total_ops as f64 / self.total_runtime.as_secs_f64().max(f64::MIN_POSITIVE)
    }

    /// `warmup_excluded_ops` divided by `warmup_excluded_runtime`.
    pub fn warmup_excluded_throughput(&self) -> f64 {
        self.warmup_excluded_ops as f64 / self.warmup_excluded_runtime.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

/// Polls until `started.elapsed()` passes the warmup period, then performs
/// the experiment's one-shot [`Measurements::reset`] and records the instant
/// the warmup-excluded timer restarts from. Always runs — independent of
/// whether status lines are printed — since the reset in spec §4.9(c) is a
/// property of every experiment, not of `-s`.
fn run_warmup_thread(
    measurements: Arc<Measurements>,
    latch: Arc<CountDownLatch>,
    started: Instant,
    stop: Arc<AtomicBool>,
    warmup_excluded_start: Arc<Mutex<Instant>>,
) {
    let warmup = Duration::from_secs_f64(WARMUP_PERIOD_SECONDS_DEFAULT);
    let tick = Duration::from_millis(200);
    loop {
        if stop.load(Ordering::Relaxed) || latch.count() == 0 {
            return;
        }
        if started.elapsed() >= warmup {
            measurements.reset();
            *warmup_excluded_start.lock() = Instant::now();
            info!("warmup window elapsed, measurements reset");
            return;
        }
        thread::sleep(tick);
    }
}

/// Prints `Measurements::status_message()` every [`STATUS_INTERVAL_SECONDS_DEFAULT`]
/// seconds. Purely cosmetic: gated by `-s`, never responsible for the warmup
/// reset (see [`run_warmup_thread`]).
fn run_status_thread(measurements: Arc<Measurements>, latch: Arc<CountDownLatch>, stop: Arc<AtomicBool>) {
    loop {
        thread::sleep(Duration::from_secs(STATUS_INTERVAL_SECONDS_DEFAULT));
        if stop.load(Ordering::Relaxed) || latch.count() == 0 {
            break;
        }
        info!(status = %measurements.status_message(), "status");
    }
}

/// Run one [`ExperimentInfo`] against a freshly constructed set of drivers:
/// reset Measurements, launch `num_threads` workers against `pool`, wait for
/// completion or the global deadline, and return a summary.
#[allow(clippy::too_many_arguments)]
pub fn run_experiment(
    factory: &DriverFactory,
    db_name: &str,
    props: &Properties,
    measurements: Arc<Measurements>,
    workload: &GraphWorkload,
    pool: &KeyPool,
    experiment: ExperimentInfo,
    sleep_on_wait: bool,
    print_status: bool,
) -> Result<ExperimentSummary> {
    measurements.reset();
    let start = Instant::now();
    let latch = Arc::new(CountDownLatch::new(experiment.num_threads));
    let stop = Arc::new(AtomicBool::new(false));
    let warmup_excluded_start = Arc::new(Mutex::new(start));

    let warmup_handle = {
        let measurements = measurements.clone();
        let latch = latch.clone();
        let stop = stop.clone();
        let warmup_excluded_start = warmup_excluded_start.clone();
        thread::spawn(move || run_warmup_thread(measurements, latch, start, stop, warmup_excluded_start))
    };

    let status_handle = if print_status {
        let measurements = measurements.clone();
        let latch = latch.clone();
        let stop = stop.clone();
        Some(thread::spawn(move || run_status_thread(measurements, latch, stop)))
    } else {
        None
    };

    let per_thread_ops = experiment.num_ops / experiment.num_threads.max(1) as u64;
    let per_thread_throughput = experiment.target_throughput / experiment.num_threads.max(1) as f64;

    let infos = thread::scope(|scope| -> Result<Vec<crate::worker::ClientThreadInfo>> {
        let mut handles = Vec::new();
        for _ in 0..experiment.num_threads {
            let measurements = measurements.clone();
            let latch = &latch;
            handles.push(scope.spawn(move || -> Result<crate::worker::ClientThreadInfo> {
                let driver = factory
                    .create(db_name, props, measurements)
                    .ok_or_else(|| anyhow!("unknown driver: {db_name}"))??;
                driver.init().context("driver init for experiment")?;
                let info = run_worker(
                    &driver,
                    workload,
                    pool,
                    per_thread_ops,
                    per_thread_throughput.max(f64::MIN_POSITIVE),
                    sleep_on_wait,
                    start,
                    latch,
                );
                driver.cleanup().context("driver cleanup for experiment")?;
                Ok(info)
            }));
        }
        let mut infos = Vec::new();
        for handle in handles {
            infos.push(handle.join().map_err(|_| anyhow!("worker thread panicked"))??);
        }
        Ok(infos)
    })?;

    stop.store(true, Ordering::Relaxed);
    let _ = warmup_handle.join();
    if let Some(handle) = status_handle {
        let _ = handle.join();
    }

    let summary = ExperimentSummary {
        total_runtime: start.elapsed(),
        total_ops: infos.iter().map(|i| i.completed_ops).sum(),
        overtime_ops: infos.iter().map(|i| i.overtime_ops).sum(),
        failed_ops: infos.iter().map(|i| i.failed_ops).sum(),
        warmup_excluded_runtime: warmup_excluded_start.lock().elapsed(),
        warmup_excluded_ops: measurements.total_num_ops(),
    };

    let epoch_millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    measurements.write_latencies(std::path::Path::new(RESULTS_DIR), epoch_millis)?;

    Ok(summary)
}

/// Runs every experiment in `experiments` back to back, observing the
/// pre-run quiesce interval once and the inter-experiment gap between each
/// pair.
#[allow(clippy::too_many_arguments)]
pub fn run_experiments(
    factory: &DriverFactory,
    db_name: &str,
    props: &Properties,
    measurements: Arc<Measurements>,
    workload: &GraphWorkload,
    pool: &KeyPool,
    experiments: &[ExperimentInfo],
    sleep_on_wait: bool,
    print_status: bool,
    quiesce: bool,
) -> Result<Vec<ExperimentSummary>> {
    if quiesce {
        thread::sleep(Duration::from_secs(PRE_RUN_QUIESCE_SECONDS));
    }

    let mut summaries = Vec::with_capacity(experiments.len());
    for (i, experiment) in experiments.iter().enumerate() {
        let summary = run_experiment(
            factory,
            db_name,
            props,
            measurements.clone(),
            workload,
            pool,
            *experiment,
            sleep_on_wait,
            print_status,
        )?;
        info!(
            experiment = i,
            total_runtime_secs = summary.total_runtime.as_secs_f64(),
            total_ops = summary.total_ops,
            overall_throughput_ops_per_sec = summary.overall_throughput(),
            warmup_excluded_throughput_ops_per_sec = summary.warmup_excluded_throughput(),
            overtime_ops = summary.overtime_ops,
            failed_ops = summary.failed_ops,
            status = %measurements.status_message(),
            "experiment complete"
        );
        summaries.push(summary);
        if i + 1 < experiments.len() {
            thread::sleep(Duration::from_secs(INTER_EXPERIMENT_GAP_SECONDS));
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_ranges_cover_disjoint_contiguous_space() {
        let ranges = shard_ranges(10, 2);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], (String::new(), "005:".to_string()));
        assert_eq!(ranges[1], ("004:~".to_string(), "010:".to_string()));
    }

    #[test]
    fn shard_ranges_respect_numeric_order_past_two_digits() {
        let ranges = shard_ranges(50, 5);
        // shard 9 (in range 0, keys "009:...") must sort below range 1's floor.
        let probe = "009:tag:0:0".to_string();
        assert!(probe < ranges[1].0 || probe > ranges[0].1);
        assert!(probe > ranges[0].0 && probe < ranges[0].1);
    }

    #[test]
    fn experiment_with_zero_ops_completes_immediately() {
        use crate::config::Config;
        use crate::driver::DriverFactory;
        use crate::testdb::TestDb;
        use std::io::Cursor;

        let spec = r#"
            {"name": "operations", "weights": [1,0,0,0]}
            {"name": "read_operation_types", "values": ["obj_read"], "weights": [1]}
            {"name": "primary_shards", "weights": [1]}
            {"name": "remote_shards", "weights": [1]}
            {"name": "edge_types", "values": ["other"], "weights": [1]}
        "#;
        let config = Config::from_reader(Cursor::new(spec)).unwrap();
        let workload = GraphWorkload::new(config, 1);
        let pool = KeyPool::merge(1, vec![]);

        let mut factory = DriverFactory::new();
        factory.register("test", Box::new(|_props: &Properties| Ok(Box::new(TestDb::new()) as Box<dyn crate::driver::Driver>)));

        let measurements = Arc::new(Measurements::new());
        let props = Properties::new();
        let experiment = ExperimentInfo {
            num_threads: 1,
            num_ops: 0,
            target_throughput: 10.0,
        };
        let summary = run_experiment(
            &factory,
            "test",
            &props,
            measurements,
            &workload,
            &pool,
            experiment,
            true,
            false,
        )
        .unwrap();
        assert_eq!(summary.total_ops, 0);
    }
}
