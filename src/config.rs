//! Parses a workload-spec file into named weighted distributions.
//!
//! Each line names a field and classifies as value-bearing, type-bearing,
//! or "implicit" (index-only, for fields whose sampled value is just the
//! positional index into `weights`). Parsed with `serde_json` rather than
//! hand-rolled parsing, matching the rest of this crate's config surfaces.

use std::io::BufRead;

use ahash::AHashMap;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::generator::discrete::{Choice, DiscreteGenerator};
use crate::generator::Generator;

/// One value a field can sample to: either a bare integer (shard ids,
/// transaction sizes) or a string type-tag (operation kinds, edge types).
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Tag(String),
}

impl ConfigValue {
    /// Unwrap as an integer, failing if this field samples tags instead.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            ConfigValue::Int(v) => Ok(*v),
            ConfigValue::Tag(t) => Err(anyhow!("field sampled a tag (\"{t}\") where an integer was expected")),
        }
    }

    /// Unwrap as a tag, failing if this field samples integers instead.
    pub fn as_tag(&self) -> Result<&str> {
        match self {
            ConfigValue::Tag(t) => Ok(t),
            ConfigValue::Int(v) => Err(anyhow!("field sampled an integer ({v}) where a tag was expected")),
        }
    }
}

/// One raw line of the workload-spec file, deserialized via `serde_json`.
///
/// Mirrors `parse_config.cc`'s `LineObject`: `values` is omitted for
/// "implicit" fields such as `operations`, `primary_shards` and
/// `remote_shards`, whose choices are simply the positional index into
/// `weights`.
#[derive(Debug, Deserialize)]
struct Line {
    name: String,
    #[serde(default)]
    values: Option<Vec<serde_json::Value>>,
    weights: Vec<f64>,
}

/// Fields whose `values` entries are implicit (no `values` array in the
/// spec file; the sampled value is the positional index itself), matching
/// `parse_config.cc`'s `HAVE_NEITHER` set.
fn is_implicit_field(name: &str) -> bool {
    matches!(name, "operations" | "primary_shards" | "remote_shards")
}

/// A parsed, ready-to-sample workload specification: one
/// [`DiscreteGenerator`] per named field.
pub struct Config {
    fields: AHashMap<String, DiscreteGenerator<ConfigValue>>,
}

impl Config {
    /// Parse a workload-spec file, one JSON object per line, `#`-prefixed
    /// lines ignored as comments (consistent with the other line-oriented
    /// file formats this crate reads).
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut fields = AHashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading workload-spec line {}", lineno + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: Line = serde_json::from_str(trimmed)
                .with_context(|| format!("parsing workload-spec line {}: {trimmed}", lineno + 1))?;
            let generator = build_generator(&parsed)?;
            fields.insert(parsed.name, generator);
        }
        Ok(Self { fields })
    }

    /// Draw one sample from `field`.
    ///
    /// Fails with a `ConfigKindError`-flavored [`anyhow::Error`] if the
    /// field is absent.
    pub fn sample(&self, field: &str) -> Result<ConfigValue> {
        self.fields
            .get(field)
            .ok_or_else(|| anyhow!("config field not found: {field}"))
            .map(|g| g.next())
    }

    /// Draw an integer sample from `field`, failing if the field is absent
    /// or samples tags.
    pub fn sample_int(&self, field: &str) -> Result<i64> {
        self.sample(field)?.as_int()
    }

    /// Draw a tag sample from `field`, failing if the field is absent or
    /// samples integers.
    pub fn sample_tag(&self, field: &str) -> Result<String> {
        self.sample(field).and_then(|v| v.as_tag().map(str::to_owned))
    }

    /// Whether a field was present in the parsed spec.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Replace `primary_shards`/`remote_shards` with downsampled
    /// distributions sized to `num_shards`, per
    /// `workload.cc::ResizeShardWeights`. Must be called once after parsing
    /// when `NumShards` is smaller than the configured bucket count
    /// (`NumShards == 1` collapses to a single bucket).
    pub fn resize_shard_fields(&mut self, num_shards: u8) -> Result<()> {
        for field in ["primary_shards", "remote_shards"] {
            if let Some(generator) = self.fields.get(field) {
                let weights = weights_of(generator);
                let resized = downsample_weights(&weights, num_shards as usize);
                let choices = resized
                    .into_iter()
                    .enumerate()
                    .map(|(shard, weight)| Choice {
                        val: ConfigValue::Int(shard as i64),
                        weight,
                    })
                    .collect();
                self.fields.insert(field.to_string(), DiscreteGenerator::new(choices));
            }
        }
        Ok(())
    }
}

fn weights_of(generator: &DiscreteGenerator<ConfigValue>) -> Vec<f64> {
    generator.choice_weights()
}

fn build_generator(line: &Line) -> Result<DiscreteGenerator<ConfigValue>> {
    let choices = if is_implicit_field(&line.name) {
        line.weights
            .iter()
            .enumerate()
            .map(|(idx, &weight)| Choice {
                val: ConfigValue::Int(idx as i64),
                weight,
            })
            .collect()
    } else {
        let values = line
            .values
            .as_ref()
            .ok_or_else(|| anyhow!("field \"{}\" is missing its \"values\" array", line.name))?;
        if values.len() != line.weights.len() {
            return Err(anyhow!(
                "field \"{}\" has {} values but {} weights",
                line.name,
                values.len(),
                line.weights.len()
            ));
        }
        values
            .iter()
            .zip(line.weights.iter())
            .map(|(value, &weight)| {
                let val = match value {
                    serde_json::Value::String(s) => ConfigValue::Tag(s.clone()),
                    serde_json::Value::Number(n) => ConfigValue::Int(
                        n.as_i64()
                            .ok_or_else(|| anyhow!("field \"{}\" has a non-integer value", line.name))?,
                    ),
                    other => return Err(anyhow!("field \"{}\" has unsupported value {other}", line.name)),
                };
                Ok(Choice { val, weight })
            })
            .collect::<Result<Vec<_>>>()?
    };
    Ok(DiscreteGenerator::new(choices))
}

/// Proportionally coalesces `weights` (one per original bucket) down to
/// `target_len` buckets by merging adjacent source buckets, matching
/// `workload.cc::ResizeShardWeights`.
///
/// If `target_len >= weights.len()`, the weights are returned unchanged
/// (padded with zero-weight buckets if `target_len` is larger).
pub fn downsample_weights(weights: &[f64], target_len: usize) -> Vec<f64> {
    if target_len == 0 {
        return Vec::new();
    }
    if target_len >= weights.len() {
        let mut out = weights.to_vec();
        out.resize(target_len, 0.0);
        return out;
    }
    let mut out = vec![0.0; target_len];
    for (i, &w) in weights.iter().enumerate() {
        let bucket = i * target_len / weights.len();
        out[bucket] += w;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_values_and_implicit_fields() {
        let spec = r#"
            {"name": "operations", "weights": [1, 0, 0, 0]}
            {"name": "edge_types", "values": ["unique", "other"], "weights": [1, 1]}
        "#;
        let config = Config::from_reader(Cursor::new(spec)).unwrap();
        assert_eq!(config.sample_int("operations").unwrap(), 0);
        let tag = config.sample_tag("edge_types").unwrap();
        assert!(tag == "unique" || tag == "other");
    }

    #[test]
    fn missing_field_errors() {
        let config = Config::from_reader(Cursor::new("")).unwrap();
        assert!(config.sample("operations").is_err());
    }

    #[test]
    fn mismatched_kind_errors() {
        let spec = r#"{"name": "write_txn_sizes", "values": [2], "weights": [1]}"#;
        let config = Config::from_reader(Cursor::new(spec)).unwrap();
        assert!(config.sample_tag("write_txn_sizes").is_err());
    }

    #[test]
    fn downsample_collapses_to_single_bucket() {
        let weights = vec![1.0, 2.0, 3.0, 4.0];
        let resized = downsample_weights(&weights, 1);
        assert_eq!(resized.len(), 1);
        assert_eq!(resized[0], 10.0);
    }

    #[test]
    fn downsample_preserves_total_weight() {
        let weights = vec![1.0, 1.0, 1.0, 1.0, 1.0];
        let resized = downsample_weights(&weights, 2);
        let total: f64 = resized.iter().sum();
        assert!((total - 5.0).abs() < 1e-9);
    }
}
