//! Buffered batch-insert writer and range-scan reader that populate a
//! [`KeyPool`].

use anyhow::Result;
use itertools::Itertools;
use tracing::warn;

use crate::constants::{READ_BATCH_SIZE, WRITE_BATCH_SIZE};
use crate::driver::Driver;
use crate::edge::{Edge, EdgeType};
use crate::key::{KeyRef, TimestampValue};
use crate::keypool::KeyPoolBuilder;
use crate::status::DataTable;

/// One buffered row awaiting a batch flush.
struct BufferedRow {
    key: KeyRef,
    value: TimestampValue,
}

/// Moves rows between the workload and a [`Driver`] in bulk, and scans an
/// existing backend back into a [`KeyPoolBuilder`] at reload time.
pub struct Loader<'d, D: Driver + ?Sized> {
    driver: &'d D,
    edge_buffer: Vec<BufferedRow>,
    object_buffer: Vec<BufferedRow>,
    pool: KeyPoolBuilder,
    failed_flushes: u64,
}

impl<'d, D: Driver + ?Sized> Loader<'d, D> {
    /// Create a loader writing through `driver`, with a key pool builder
    /// sized for `num_shards` shards.
    pub fn new(driver: &'d D, num_shards: usize) -> Self {
        Self {
            driver,
            edge_buffer: Vec::new(),
            object_buffer: Vec::new(),
            pool: KeyPoolBuilder::new(num_shards),
            failed_flushes: 0,
        }
    }

    /// Total buffer flushes that failed so far.
    pub fn failed_flushes(&self) -> u64 {
        self.failed_flushes
    }

    /// Appends one edge to the loader's key-pool slice under `primary_shard`
    /// and one row to each of the edge/object buffers (the object buffer
    /// receives both endpoints), flushing whichever buffer crosses
    /// [`WRITE_BATCH_SIZE`].
    ///
    /// Returns the number of flushes that failed during this call (0 or 1,
    /// since only one buffer can cross its threshold per call).
    pub fn write_to_buffers(
        &mut self,
        primary_shard: u8,
        primary_key: String,
        remote_key: String,
        edge_type: EdgeType,
        timestamp: i64,
        value: Vec<u8>,
    ) -> u64 {
        self.pool.push(
            primary_shard,
            Edge::new(primary_key.clone(), remote_key.clone(), edge_type),
        );

        self.edge_buffer.push(BufferedRow {
            key: KeyRef::Edge(primary_key.clone(), remote_key.clone(), edge_type),
            value: TimestampValue::new(timestamp, value.clone()),
        });
        self.object_buffer.push(BufferedRow {
            key: KeyRef::Object(primary_key),
            value: TimestampValue::new(timestamp, value.clone()),
        });
        self.object_buffer.push(BufferedRow {
            key: KeyRef::Object(remote_key),
            value: TimestampValue::new(timestamp, value),
        });

        let mut failed = 0;
        if self.edge_buffer.len() >= WRITE_BATCH_SIZE && !self.flush_edge_buffer() {
            failed += 1;
        }
        if self.object_buffer.len() >= WRITE_BATCH_SIZE && !self.flush_object_buffer() {
            failed += 1;
        }
        failed
    }

    /// Flush the accumulated edge rows via `Driver::batch_insert`. Returns
    /// `true` on success. A failure is logged but never retried here: the
    /// load-phase retry policy is "none".
    pub fn flush_edge_buffer(&mut self) -> bool {
        let ok = flush(self.driver, DataTable::Edges, &self.edge_buffer);
        self.edge_buffer.clear();
        if !ok {
            self.failed_flushes += 1;
        }
        ok
    }

    /// Flush the accumulated object rows via `Driver::batch_insert`.
    pub fn flush_object_buffer(&mut self) -> bool {
        let ok = flush(self.driver, DataTable::Objects, &self.object_buffer);
        self.object_buffer.clear();
        if !ok {
            self.failed_flushes += 1;
        }
        ok
    }

    /// Repeatedly calls `Driver::batch_read` to walk the Edges table in the
    /// half-open interval `(start_floor_key, end_ceiling_key)`, inserting
    /// every returned row into the key-pool slice. Each batch is keyed from
    /// the last returned triple; the loop ends when a scan returns empty.
    ///
    /// Returns the number of batch-read calls that returned a hard error.
    /// A batch-read failure during reload is fatal to the experiment, so
    /// the first such failure short-circuits with an error.
    pub fn reload_from_db(&mut self, start_floor_key: &str, end_ceiling_key: &str) -> Result<u64> {
        let mut floor = start_floor_key.to_string();
        let mut reloaded = 0u64;
        loop {
            let rows = self
                .driver
                .batch_read(DataTable::Edges, &floor, end_ceiling_key, READ_BATCH_SIZE)
                .map_err(|status| {
                    anyhow::anyhow!("reload batch_read failed for interval ({floor}, {end_ceiling_key}): {status}")
                })?;
            if rows.is_empty() {
                break;
            }
            for (edge, _value) in &rows {
                let shard = crate::key::shard_of(&edge.primary_key)?;
                self.pool.push(shard, edge.clone());
            }
            reloaded += rows.len() as u64;
            let (last_edge, _) = rows.last().expect("checked non-empty above");
            floor = last_edge.primary_key.clone();
        }
        Ok(reloaded)
    }

    /// Consume the loader, returning its accumulated key-pool slice.
    pub fn into_shards(self) -> Vec<Vec<Edge>> {
        self.pool.into_shards()
    }
}

fn flush<D: Driver + ?Sized>(driver: &D, table: DataTable, rows: &[BufferedRow]) -> bool {
    if rows.is_empty() {
        return true;
    }
    let keys = rows.iter().map(|r| r.key.clone()).collect_vec();
    let values = rows.iter().map(|r| r.value.clone()).collect_vec();
    let status = driver.batch_insert(table, &keys, &values);
    if !status.is_ok() {
        warn!(%table, %status, "batch flush failed");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::TestDb;

    #[test]
    fn write_to_buffers_flushes_at_threshold() {
        let db = TestDb::new();
        let mut loader = Loader::new(&db, 1);
        let mut total_failed = 0;
        for i in 0..WRITE_BATCH_SIZE {
            total_failed += loader.write_to_buffers(
                0,
                format!("0:t:{i}:0"),
                format!("0:t:{i}r:0"),
                EdgeType::Other,
                i as i64 + 1,
                vec![b'a'; 4],
            );
        }
        assert_eq!(total_failed, 0);
        assert_eq!(loader.failed_flushes(), 0);
        // edge buffer flushed exactly once at the threshold; object buffer
        // crosses its threshold earlier since it receives two rows per call.
        assert!(loader.edge_buffer.is_empty());
    }

    #[test]
    fn reload_from_empty_interval_is_not_an_error() {
        let db = TestDb::new();
        let mut loader = Loader::new(&db, 1);
        let reloaded = loader.reload_from_db("0:a:0:0", "0:z:0:0").unwrap();
        assert_eq!(reloaded, 0);
    }
}
