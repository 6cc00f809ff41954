//! The in-process index of known edges used to draw realistic read/update/
//! delete targets.
//!
//! Built append-only, per shard, during load and reload; frozen for the
//! entire run phase. Shards are a small dense range, so a `Vec` indexed by
//! `ShardId` is used in place of a generic hash map.

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::edge::Edge;

/// Accumulates edges for a single loader/thread during load or reload.
/// Merged into a shared, read-only [`KeyPool`] once the phase completes.
#[derive(Debug)]
pub struct KeyPoolBuilder {
    shards: Vec<Vec<Edge>>,
}

impl KeyPoolBuilder {
    /// Create a builder sized for `num_shards` shards.
    pub fn new(num_shards: usize) -> Self {
        Self {
            shards: (0..num_shards).map(|_| Vec::new()).collect(),
        }
    }

    /// Append one edge under `shard`.
    pub fn push(&mut self, shard: u8, edge: Edge) {
        self.shards[shard as usize].push(edge);
    }

    /// Consume the builder, returning its per-shard edge lists.
    pub fn into_shards(self) -> Vec<Vec<Edge>> {
        self.shards
    }
}

/// The frozen, read-only pool of edges the run phase draws from.
#[derive(Debug)]
pub struct KeyPool {
    shards: Vec<Vec<Edge>>,
}

impl KeyPool {
    /// Merge per-loader shard slices (one `Vec<Vec<Edge>>` per loader) into
    /// a single immutable pool, concatenating same-shard lists across
    /// loaders.
    pub fn merge(num_shards: usize, parts: Vec<Vec<Vec<Edge>>>) -> Self {
        let mut shards: Vec<Vec<Edge>> = (0..num_shards).map(|_| Vec::new()).collect();
        for part in parts {
            for (shard, mut edges) in part.into_iter().enumerate() {
                shards[shard].append(&mut edges);
            }
        }
        Self { shards }
    }

    /// Total number of edges loaded across all shards.
    pub fn num_loaded_edges(&self) -> u64 {
        self.shards.iter().map(|s| s.len() as u64).sum()
    }

    /// Draw a shard id via `sample_shard`, retrying until it hits a
    /// non-empty bucket, then draw a uniform-random edge from that bucket.
    ///
    /// Only guaranteed to terminate if at least one bucket is non-empty.
    pub fn random_edge<F>(&self, mut sample_shard: F) -> Result<&Edge>
    where
        F: FnMut() -> Result<u8>,
    {
        if self.num_loaded_edges() == 0 {
            return Err(anyhow!("key pool is empty: no edges to draw from"));
        }
        loop {
            let shard = sample_shard()?;
            let bucket = &self.shards[shard as usize];
            if bucket.is_empty() {
                continue;
            }
            let idx = rand::thread_rng().gen_range(0..bucket.len());
            return Ok(&bucket[idx]);
        }
    }

    /// Number of shards this pool is partitioned over.
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeType;

    fn edge(tag: &str) -> Edge {
        Edge::new(format!("0:{tag}:0:0"), format!("0:{tag}:1:0"), EdgeType::Other)
    }

    #[test]
    fn merge_concatenates_same_shard_across_loaders() {
        let mut a = KeyPoolBuilder::new(2);
        a.push(0, edge("a"));
        let mut b = KeyPoolBuilder::new(2);
        b.push(0, edge("b"));
        b.push(1, edge("c"));

        let pool = KeyPool::merge(2, vec![a.into_shards(), b.into_shards()]);
        assert_eq!(pool.num_loaded_edges(), 3);
    }

    #[test]
    fn random_edge_skips_empty_buckets() {
        let mut builder = KeyPoolBuilder::new(3);
        builder.push(2, edge("only"));
        let pool = KeyPool::merge(3, vec![builder.into_shards()]);

        let mut attempt = 0u8;
        let edge = pool
            .random_edge(|| {
                let shard = attempt % 3;
                attempt += 1;
                Ok(shard)
            })
            .unwrap();
        assert_eq!(edge.primary_key, "0:only:0:0");
    }

    #[test]
    fn random_edge_on_empty_pool_errors() {
        let pool = KeyPool::merge(1, vec![]);
        assert!(pool.random_edge(|| Ok(0)).is_err());
    }
}
