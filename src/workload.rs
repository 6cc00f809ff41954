//! Constructs single operations and transactions from [`Config`] +
//! [`KeyPool`] + a value generator.
//!
//! The thread-local key counter uses the atomic `counter::UsizeCounter`,
//! seeded to a uniform random 32-bit integer so that two processes
//! generating keys concurrently don't collide.

use std::cell::RefCell;

use anyhow::Result;

use crate::config::Config;
use crate::constants::{KEY_POOL_FACTOR, VALUE_SIZE_BYTES};
use crate::driver::Driver;
use crate::edge::{Edge, EdgeType};
use crate::generator::counter::UsizeCounter;
use crate::generator::{Counter, Generator};
use crate::key::{KeyRef, Operation, TimestampValue, Transaction};
use crate::keypool::KeyPool;
use crate::loader::Loader;
use crate::status::{DataTable, OpKind};
use crate::utils::{current_time_nanos, random_thread_tag, random_value};

thread_local! {
    static KEY_COUNTER: UsizeCounter = UsizeCounter::new(rand::random::<u32>() as usize);
    static THREAD_TAG: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn thread_tag() -> String {
    THREAD_TAG.with(|cell| {
        let mut tag = cell.borrow_mut();
        if tag.is_none() {
            *tag = Some(random_thread_tag());
        }
        tag.clone().expect("just set above")
    })
}

fn next_key_counter() -> usize {
    KEY_COUNTER.with(|c| c.next())
}

/// The four values `operations` samples over, in the order their weights
/// are listed in the workload-spec file.
const OPERATION_TAGS: [&str; 4] = ["read_op", "write_op", "read_txn", "write_txn"];

/// Produces the next request against a [`KeyPool`], governed by [`Config`].
///
/// This crate ships one implementor, [`GraphWorkload`]; the trait exists so
/// [`crate::worker::run_worker`] and the runner stay generic over it rather
/// than hard-coding the concrete type, matching how [`crate::driver::Driver`]
/// is consumed generically elsewhere in the core.
pub trait Workload: Send + Sync {
    /// Draw primary/remote shards and an edge type from Config, synthesize
    /// keys, stamp a fresh timestamp, fabricate a random value, and hand it
    /// all to `loader.write_to_buffers`. Returns the number of buffer
    /// flushes that failed during this call.
    fn load_row<D: Driver + ?Sized>(&self, loader: &mut Loader<'_, D>) -> Result<u64>;

    /// Sum of `num_requests` samples of `write_txn_sizes`, multiplied by
    /// [`KEY_POOL_FACTOR`]. Used by the load phase to size its target.
    fn num_keys_to_generate(&self, num_requests: u64) -> Result<u64>;

    /// Sample `operations`, dispatch to one of {read, write, read
    /// transaction, write transaction} drawing existing edges from `pool`,
    /// invoke the driver, and return its success boolean.
    fn next_request<D: Driver + ?Sized>(&self, pool: &KeyPool, driver: &D) -> bool;
}

/// The trace-driven workload generator: the sole implementor of
/// [`Workload`].
pub struct GraphWorkload {
    config: Config,
    num_shards: u8,
}

impl GraphWorkload {
    /// Build a workload generator over an already-parsed, already-resized
    /// (`Config::resize_shard_fields`) [`Config`].
    pub fn new(config: Config, num_shards: u8) -> Self {
        Self { config, num_shards }
    }

    fn sample_shard(&self, field: &str) -> Result<u8> {
        let idx = self.config.sample_int(field)?;
        let shard = idx.rem_euclid(self.num_shards.max(1) as i64) as u8;
        Ok(shard)
    }

    fn generate_key(&self, shard: u8) -> String {
        format!(
            "{:0width$}:{}:{}:{}",
            shard,
            thread_tag(),
            next_key_counter(),
            current_time_nanos(),
            width = crate::constants::SHARD_KEY_WIDTH,
        )
    }

    fn fresh_edge(&self) -> Result<(String, String, EdgeType)> {
        let primary_shard = self.sample_shard("primary_shards")?;
        let remote_shard = self.sample_shard("remote_shards")?;
        let edge_type = EdgeType::from_tag(&self.config.sample_tag("edge_types")?)?;
        let primary_key = self.generate_key(primary_shard);
        let remote_key = self.generate_key(remote_shard);
        Ok((primary_key, remote_key, edge_type))
    }

    fn random_edge(&self, pool: &KeyPool) -> Result<Edge> {
        pool.random_edge(|| self.sample_shard("primary_shards")).map(|edge| edge.clone())
    }

    /// Build one read op by sampling a tag from `field`, drawing a random
    /// edge from `pool`, and producing `Read(Edges, ...)` if the tag
    /// contains "edge", else `Read(Objects, ...)` (reusing the edge's
    /// primary key).
    fn read_op(&self, field: &str, pool: &KeyPool) -> Result<Operation> {
        let tag = self.config.sample_tag(field)?;
        let edge = self.random_edge(pool)?;
        if tag.contains("edge") {
            Ok(Operation::read(
                DataTable::Edges,
                KeyRef::Edge(edge.primary_key, edge.remote_key, edge.edge_type),
            ))
        } else {
            Ok(Operation::read(DataTable::Objects, KeyRef::Object(edge.primary_key)))
        }
    }

    /// Build one write op: pick a tag from `write_operation_types`, decode
    /// its suffix into Insert/Update/Delete, choose Edges vs. Objects by
    /// whether the tag contains "edge", and attach a fresh timestamp and
    /// random value. Insert synthesizes a fresh edge; Update/Delete reuse
    /// an existing one from `pool`.
    fn write_op(&self, pool: &KeyPool) -> Result<Operation> {
        let tag = self.config.sample_tag("write_operation_types")?;
        let kind = if tag.ends_with("add") {
            OpKind::Insert
        } else if tag.ends_with("update") {
            OpKind::Update
        } else if tag.ends_with("delete") {
            OpKind::Delete
        } else {
            anyhow::bail!("write_operation_types tag has unrecognized suffix: {tag}");
        };

        let is_edge = tag.contains("edge");
        let timestamp = current_time_nanos();
        let value = random_value(VALUE_SIZE_BYTES);

        let (table, key) = if kind == OpKind::Insert {
            let (primary_key, remote_key, edge_type) = self.fresh_edge()?;
            if is_edge {
                (DataTable::Edges, KeyRef::Edge(primary_key, remote_key, edge_type))
            } else {
                (DataTable::Objects, KeyRef::Object(primary_key))
            }
        } else {
            let edge = self.random_edge(pool)?;
            if is_edge {
                (
                    DataTable::Edges,
                    KeyRef::Edge(edge.primary_key, edge.remote_key, edge.edge_type),
                )
            } else {
                (DataTable::Objects, KeyRef::Object(edge.primary_key))
            }
        };

        Ok(Operation::write(table, key, kind, TimestampValue::new(timestamp, value)))
    }

    fn read_transaction(&self, pool: &KeyPool) -> Result<Transaction> {
        let size = self.config.sample_int("read_txn_sizes")?;
        (0..size).map(|_| self.read_op("read_txn_operation_types", pool)).collect()
    }

    fn write_transaction(&self, pool: &KeyPool) -> Result<Transaction> {
        let size = self.config.sample_int("write_txn_sizes")?;
        (0..size).map(|_| self.write_op(pool)).collect()
    }

    fn dispatch<D: Driver + ?Sized>(&self, pool: &KeyPool, driver: &D) -> Result<bool> {
        let idx = self.config.sample_int("operations")?;
        let tag = *OPERATION_TAGS
            .get(idx as usize)
            .ok_or_else(|| anyhow::anyhow!("operations index {idx} out of range"))?;
        match tag {
            "read_op" => {
                let op = self.read_op("read_operation_types", pool)?;
                Ok(driver.execute(&op).is_ok())
            }
            "write_op" => {
                let op = self.write_op(pool)?;
                Ok(driver.execute(&op).is_ok())
            }
            "read_txn" => {
                let txn = self.read_transaction(pool)?;
                Ok(driver.execute_transaction(&txn, true).is_ok())
            }
            "write_txn" => {
                let txn = self.write_transaction(pool)?;
                Ok(driver.execute_transaction(&txn, false).is_ok())
            }
            other => anyhow::bail!("unrecognized operation tag: {other}"),
        }
    }
}

impl Workload for GraphWorkload {
    fn load_row<D: Driver + ?Sized>(&self, loader: &mut Loader<'_, D>) -> Result<u64> {
        let primary_shard = self.sample_shard("primary_shards")?;
        let remote_shard = self.sample_shard("remote_shards")?;
        let edge_type = EdgeType::from_tag(&self.config.sample_tag("edge_types")?)?;
        let primary_key = self.generate_key(primary_shard);
        let remote_key = self.generate_key(remote_shard);
        let timestamp = current_time_nanos();
        let value = random_value(VALUE_SIZE_BYTES);

        Ok(loader.write_to_buffers(primary_shard, primary_key, remote_key, edge_type, timestamp, value))
    }

    fn num_keys_to_generate(&self, num_requests: u64) -> Result<u64> {
        let mut total: i64 = 0;
        for _ in 0..num_requests {
            total += self.config.sample_int("write_txn_sizes")?;
        }
        Ok(total as u64 * KEY_POOL_FACTOR)
    }

    fn next_request<D: Driver + ?Sized>(&self, pool: &KeyPool, driver: &D) -> bool {
        self.dispatch(pool, driver).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypool::KeyPoolBuilder;
    use crate::testdb::TestDb;
    use std::io::Cursor;

    fn one_edge_pool() -> KeyPool {
        let mut builder = KeyPoolBuilder::new(1);
        builder.push(0, Edge::new("0:t:1:1".into(), "0:t:2:2".into(), EdgeType::Other));
        KeyPool::merge(1, vec![builder.into_shards()])
    }

    fn config_with(spec: &str) -> Config {
        Config::from_reader(Cursor::new(spec)).unwrap()
    }

    #[test]
    fn single_read_operation_spec_always_reads() {
        let spec = r#"
            {"name": "operations", "weights": [1, 0, 0, 0]}
            {"name": "read_operation_types", "values": ["obj_read"], "weights": [1]}
            {"name": "primary_shards", "weights": [1]}
            {"name": "remote_shards", "weights": [1]}
            {"name": "edge_types", "values": ["other"], "weights": [1]}
        "#;
        let config = config_with(spec);
        let workload = GraphWorkload::new(config, 1);
        let pool = one_edge_pool();
        let db = TestDb::new();

        let measurements = std::sync::Arc::new(crate::measurements::Measurements::new());
        let timed = crate::driver::TimedDriver::new(Box::new(db), measurements.clone());
        for _ in 0..10 {
            assert!(workload.next_request(&pool, &timed));
        }
        assert_eq!(measurements.count(OpKind::Read), 10);
    }

    #[test]
    fn transaction_sizes_match_config_and_are_homogeneous() {
        let spec = r#"
            {"name": "write_txn_sizes", "values": [3], "weights": [1]}
            {"name": "write_operation_types", "values": ["edge_add"], "weights": [1]}
            {"name": "primary_shards", "weights": [1]}
            {"name": "remote_shards", "weights": [1]}
            {"name": "edge_types", "values": ["other"], "weights": [1]}
        "#;
        let config = config_with(spec);
        let workload = GraphWorkload::new(config, 1);
        let txn = workload.write_transaction(&one_edge_pool()).unwrap();
        assert_eq!(txn.len(), 3);
        assert!(txn.iter().all(|op| op.kind == OpKind::Insert));
    }

    #[test]
    fn num_keys_to_generate_applies_key_pool_factor() {
        let spec = r#"{"name": "write_txn_sizes", "values": [2], "weights": [1]}"#;
        let config = config_with(spec);
        let workload = GraphWorkload::new(config, 1);
        assert_eq!(workload.num_keys_to_generate(1000).unwrap(), 6000);
    }
}
