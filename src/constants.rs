//! Process-wide tuning constants shared by the loader, the rate-paced worker
//! and the experiment runner.

/// Default shard count, overridable via `-shards`. Hard ceiling is 127 for
/// bit-packing headroom on the shard prefix.
pub const NUM_SHARDS_DEFAULT: u8 = 50;

/// Shard ids must stay strictly below this ceiling.
pub const NUM_SHARDS_CEILING: u8 = 127;

/// Loader buffer size before an automatic flush.
pub const WRITE_BATCH_SIZE: usize = 256;

/// Page size used by `reload_from_db`'s range scans.
pub const READ_BATCH_SIZE: usize = 500;

/// Multiplier applied to the expected number of write-transaction keys when
/// sizing the load phase's key pool target.
pub const KEY_POOL_FACTOR: u64 = 3;

/// Fixed size, in bytes, of every generated record value.
pub const VALUE_SIZE_BYTES: usize = 150;

/// Hard wall-clock ceiling for a single experiment, in seconds.
pub const TIMEOUT_LIMIT_SECONDS: f64 = 60.0 * 10.2;

/// Default warmup window, in seconds, after which `Measurements` is reset once.
pub const WARMUP_PERIOD_SECONDS_DEFAULT: f64 = 60.0;

/// Default status-line print interval, in seconds.
pub const STATUS_INTERVAL_SECONDS_DEFAULT: u64 = 10;

/// Quiesce interval observed between reload and the first experiment.
pub const PRE_RUN_QUIESCE_SECONDS: u64 = 240;

/// Gap observed between two consecutive experiments.
pub const INTER_EXPERIMENT_GAP_SECONDS: u64 = 30;

/// Directory latency dumps are written under.
pub const RESULTS_DIR: &str = "final_results4";

/// Zero-padded width of the shard prefix in generated keys, sized to
/// [`NUM_SHARDS_CEILING`]'s three digits. Keys are zero-padded so a plain
/// lexicographic string comparison of key prefixes agrees with numeric
/// shard order — load-bearing for `runner::shard_ranges`' range-scan bounds.
pub const SHARD_KEY_WIDTH: usize = 3;
