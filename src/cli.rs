//! Command-line parsing, the properties file, and the experiment file.
//! Kept out of the core library's measured scope but carried here as the
//! thin binary front end's input layer: a hand-rolled `std::env::args`
//! parser rather than a `clap` dependency, since the flag surface is small
//! and fixed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;
use anyhow::{anyhow, Context, Result};

/// A flat `key=value` property bag, loaded from a `-P` file and overridden
/// by `-p key=value` flags. Uses `ahash` rather than the default `SipHash`
/// since keys here never come from an adversarial source.
#[derive(Debug, Default, Clone)]
pub struct Properties {
    values: AHashMap<String, String>,
}

impl Properties {
    /// An empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, overwriting any prior value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up `key`, falling back to `default` if absent.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load `key=value` lines from `path`, `#`-prefixed lines and blank
    /// lines ignored. Existing keys are overwritten by later lines.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).with_context(|| format!("opening properties file {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (key, value) = trimmed
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed properties line (expected key=value): {trimmed}"))?;
            self.set(key.trim(), value.trim());
        }
        Ok(())
    }
}

/// One line of the experiment file: `num_threads,num_ops,target_throughput`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperimentInfo {
    /// Worker thread count for this experiment.
    pub num_threads: usize,
    /// Total ops (across all threads) this experiment runs.
    pub num_ops: u64,
    /// Target aggregate throughput, ops/sec.
    pub target_throughput: f64,
}

/// Parse an experiment file: one `num_threads,num_ops,target_throughput`
/// triple per line; `#`-prefixed lines are ignored.
pub fn load_experiments(path: &Path) -> Result<Vec<ExperimentInfo>> {
    let file = File::open(path).with_context(|| format!("opening experiment file {}", path.display()))?;
    let mut experiments = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(anyhow!(
                "experiment file line {} has {} fields, expected 3: {trimmed}",
                lineno + 1,
                fields.len()
            ));
        }
        experiments.push(ExperimentInfo {
            num_threads: fields[0].parse().with_context(|| format!("parsing num_threads on line {}", lineno + 1))?,
            num_ops: fields[1].parse().with_context(|| format!("parsing num_ops on line {}", lineno + 1))?,
            target_throughput: fields[2]
                .parse()
                .with_context(|| format!("parsing target_throughput on line {}", lineno + 1))?,
        });
    }
    Ok(experiments)
}

/// Which phase a parsed command line selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    Run,
}

/// The result of parsing the CLI surface.
#[derive(Debug, Clone)]
pub struct Args {
    pub phase: Phase,
    pub threads: usize,
    pub db: String,
    pub properties_file: Option<String>,
    pub property_overrides: Vec<(String, String)>,
    pub config_file: Option<String>,
    pub experiment_file: Option<String>,
    pub num_shards: u8,
    pub total_ops: u64,
    pub total_rows: u64,
    pub status: bool,
    pub spin: bool,
}

/// Parse `args` (typically `std::env::args().skip(1)`). `-load` and
/// `-run`/`-t` are mutually exclusive; at least one must be present.
pub fn parse_command_line<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut phase = None;
    let mut threads = 1usize;
    let mut db = None;
    let mut properties_file = None;
    let mut property_overrides = Vec::new();
    let mut config_file = None;
    let mut experiment_file = None;
    let mut num_shards = crate::constants::NUM_SHARDS_DEFAULT;
    let mut total_ops = 0u64;
    let mut total_rows = 0u64;
    let mut status = false;
    let mut spin = false;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-load" => phase = Some(Phase::Load),
            "-run" | "-t" => phase = Some(Phase::Run),
            "-threads" => threads = next_value(&mut it, "-threads")?.parse()?,
            "-db" => db = Some(next_value(&mut it, "-db")?),
            "-P" => properties_file = Some(next_value(&mut it, "-P")?),
            "-p" => {
                let kv = next_value(&mut it, "-p")?;
                let (k, v) = kv
                    .split_once('=')
                    .ok_or_else(|| anyhow!("-p expects key=value, got: {kv}"))?;
                property_overrides.push((k.to_string(), v.to_string()));
            }
            "-C" => config_file = Some(next_value(&mut it, "-C")?),
            "-E" => experiment_file = Some(next_value(&mut it, "-E")?),
            "-shards" => num_shards = next_value(&mut it, "-shards")?.parse()?,
            "-n" => total_ops = next_value(&mut it, "-n")?.parse()?,
            "-rows" => total_rows = next_value(&mut it, "-rows")?.parse()?,
            "-s" => status = true,
            "-spin" => spin = true,
            other => return Err(anyhow!("unrecognized argument: {other}")),
        }
    }

    if num_shards >= crate::constants::NUM_SHARDS_CEILING {
        return Err(anyhow!(
            "-shards {num_shards} exceeds the hard ceiling of {}",
            crate::constants::NUM_SHARDS_CEILING
        ));
    }

    Ok(Args {
        phase: phase.ok_or_else(|| anyhow!("exactly one of -load or -run/-t must be given"))?,
        threads,
        db: db.ok_or_else(|| anyhow!("-db NAME is required"))?,
        properties_file,
        property_overrides,
        config_file,
        experiment_file,
        num_shards,
        total_ops,
        total_rows,
        status,
        spin,
    })
}

fn next_value<I: Iterator<Item = String>>(it: &mut I, flag: &str) -> Result<String> {
    it.next().ok_or_else(|| anyhow!("{flag} requires a value"))
}

/// Builds the [`Properties`] bag `Args` implies: loads `properties_file`
/// (if set) then layers `property_overrides` on top.
pub fn resolve_properties(args: &Args) -> Result<Properties> {
    let mut props = Properties::new();
    if let Some(path) = &args.properties_file {
        props.load(Path::new(path))?;
    }
    for (k, v) in &args.property_overrides {
        props.set(k.clone(), v.clone());
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_load_phase_with_overrides() {
        let args = parse_command_line(
            ["-load", "-db", "test", "-threads", "4", "-n", "1000", "-p", "foo=bar"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(args.phase, Phase::Load);
        assert_eq!(args.threads, 4);
        assert_eq!(args.total_ops, 1000);
        assert_eq!(args.property_overrides, vec![("foo".to_string(), "bar".to_string())]);
    }

    #[test]
    fn missing_phase_is_an_error() {
        let result = parse_command_line(["-db", "test"].into_iter().map(String::from));
        assert!(result.is_err());
    }

    #[test]
    fn experiment_file_parses_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiments.csv");
        std::fs::write(&path, "# comment\n2,100,50\n4,200,100\n").unwrap();
        let experiments = load_experiments(&path).unwrap();
        assert_eq!(experiments.len(), 2);
        assert_eq!(
            experiments[0],
            ExperimentInfo {
                num_threads: 2,
                num_ops: 100,
                target_throughput: 50.0
            }
        );
    }
}
