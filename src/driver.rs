//! The contract pluggable database backends implement.
//!
//! A richer operation set than a plain CRUD trait: explicit transactions,
//! batch load operations, and a closed [`Status`] return type in place of
//! `Result<()>` for outcomes that are expected, not exceptional. `init`/
//! `cleanup` stay `anyhow::Result` since a failure there is a genuine setup
//! error, distinct from the in-band `Status` outcomes of steady-state calls.

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use anyhow::Result;

use crate::cli::Properties;
use crate::edge::Edge;
use crate::key::{KeyRef, Operation, TimestampValue, Transaction};
use crate::measurements::Measurements;
use crate::status::{DataTable, OpKind, Status};

/// The abstraction the core consumes; concrete implementations (SQL,
/// Spanner, Cassandra, etc.) are external and out of scope for this crate.
///
/// Implementors must never let an exception/panic escape an operation: every
/// failure mode observable to the harness is a [`Status`] variant.
pub trait Driver: Send + Sync {
    /// Initialize any per-worker state. Called once per Driver instance;
    /// there is one Driver instance per worker per phase per experiment.
    fn init(&self) -> Result<()>;

    /// Tear down per-worker state. Called once, when the worker exits the
    /// phase.
    fn cleanup(&self) -> Result<()>;

    /// Read a row. Returns at most one value for `Objects`; for `Edges`
    /// returns at most one value per matching row.
    fn read(&self, table: DataTable, key: &KeyRef) -> (Vec<TimestampValue>, Status);

    /// Update a row. Only observable if `value.timestamp` strictly exceeds
    /// the row's stored timestamp.
    fn update(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status;

    /// Insert a row. Must fail with [`Status::ContentionError`] or
    /// [`Status::Error`] if insertion would violate edge-semantics exclusivity.
    fn insert(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status;

    /// Delete a row. Only observable if `value.timestamp` strictly exceeds
    /// the row's stored timestamp.
    fn delete(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status;

    /// Range scan. Reserved for future use; drivers may return
    /// [`Status::NotImplemented`].
    fn scan(&self, table: DataTable, key: &KeyRef, n: usize) -> (Vec<TimestampValue>, Status);

    /// Non-transactional bulk insert used by the load phase.
    fn batch_insert(&self, table: DataTable, keys: &[KeyRef], values: &[TimestampValue]) -> Status;

    /// Returns up to `n` edge rows strictly between `floor_key` and
    /// `ceiling_key`, in sorted (id1, id2, type) order. An empty result is a
    /// valid terminating condition for reload, not an error.
    fn batch_read(
        &self,
        table: DataTable,
        floor_key: &str,
        ceiling_key: &str,
        n: usize,
    ) -> Result<Vec<(Edge, TimestampValue)>, Status>;

    /// Atomic execution across `ops`. May return
    /// [`Status::ContentionError`] on abort.
    fn execute_transaction(&self, ops: &Transaction, read_only: bool) -> Status;

    /// Convenience single-op dispatcher; forwards to the appropriate
    /// required method based on `op.kind`. Result rows (for Read/Scan) are
    /// discarded; only the [`Status`] is surfaced.
    fn execute(&self, op: &Operation) -> Status {
        match op.kind {
            OpKind::Read => self.read(op.table, &op.key).1,
            OpKind::Scan => self.scan(op.table, &op.key, 1).1,
            OpKind::Insert => {
                let value = op
                    .value
                    .as_ref()
                    .expect("Insert operations always carry a value");
                self.insert(op.table, &op.key, value)
            }
            OpKind::Update => {
                let value = op
                    .value
                    .as_ref()
                    .expect("Update operations always carry a value");
                self.update(op.table, &op.key, value)
            }
            OpKind::Delete => {
                let value = op
                    .value
                    .as_ref()
                    .expect("Delete operations always carry a value");
                self.delete(op.table, &op.key, value)
            }
            OpKind::ReadModifyWrite | OpKind::ReadTransaction | OpKind::WriteTransaction => {
                Status::NotImplemented
            }
        }
    }
}

/// A call outcome that carries a [`Status`], so [`TimedDriver::timed`] can
/// tell whether the call completed and should be reported.
trait CarriesStatus {
    fn status(&self) -> &Status;
}

impl CarriesStatus for Status {
    fn status(&self) -> &Status {
        self
    }
}

impl<T> CarriesStatus for (T, Status) {
    fn status(&self) -> &Status {
        &self.1
    }
}

/// Wraps any [`Driver`], timing every call and reporting the latency to a
/// shared [`Measurements`] — but only for calls that complete with
/// [`Status::Ok`]; a failed or contended call is counted by the caller's own
/// failure bookkeeping, not by `Measurements`.
///
/// Transactions are tagged [`OpKind::ReadTransaction`] when their first
/// operation is a Read or Scan, [`OpKind::WriteTransaction`] otherwise.
pub struct TimedDriver {
    inner: Box<dyn Driver>,
    measurements: Arc<Measurements>,
}

impl TimedDriver {
    /// Wrap `inner`, reporting successful calls' latency to `measurements`.
    pub fn new(inner: Box<dyn Driver>, measurements: Arc<Measurements>) -> Self {
        Self { inner, measurements }
    }

    fn timed<T: CarriesStatus>(&self, kind: OpKind, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        if result.status().is_ok() {
            self.measurements.report(kind, start.elapsed().as_nanos() as u64);
        }
        result
    }
}

impl Driver for TimedDriver {
    fn init(&self) -> Result<()> {
        self.inner.init()
    }

    fn cleanup(&self) -> Result<()> {
        self.inner.cleanup()
    }

    fn read(&self, table: DataTable, key: &KeyRef) -> (Vec<TimestampValue>, Status) {
        self.timed(OpKind::Read, || self.inner.read(table, key))
    }

    fn update(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        self.timed(OpKind::Update, || self.inner.update(table, key, value))
    }

    fn insert(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        self.timed(OpKind::Insert, || self.inner.insert(table, key, value))
    }

    fn delete(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        self.timed(OpKind::Delete, || self.inner.delete(table, key, value))
    }

    fn scan(&self, table: DataTable, key: &KeyRef, n: usize) -> (Vec<TimestampValue>, Status) {
        self.timed(OpKind::Scan, || self.inner.scan(table, key, n))
    }

    fn batch_insert(&self, table: DataTable, keys: &[KeyRef], values: &[TimestampValue]) -> Status {
        self.inner.batch_insert(table, keys, values)
    }

    fn batch_read(
        &self,
        table: DataTable,
        floor_key: &str,
        ceiling_key: &str,
        n: usize,
    ) -> Result<Vec<(Edge, TimestampValue)>, Status> {
        self.inner.batch_read(table, floor_key, ceiling_key, n)
    }

    fn execute_transaction(&self, ops: &Transaction, read_only: bool) -> Status {
        let kind = match ops.first() {
            Some(op) if matches!(op.kind, OpKind::Read | OpKind::Scan) => OpKind::ReadTransaction,
            _ => OpKind::WriteTransaction,
        };
        self.timed(kind, || self.inner.execute_transaction(ops, read_only))
    }

    fn execute(&self, op: &Operation) -> Status {
        self.timed(op.kind, || self.inner.execute(op))
    }
}

/// Constructs a fresh, unwrapped [`Driver`] instance from properties.
pub type DriverConstructor = Box<dyn Fn(&Properties) -> Result<Box<dyn Driver>> + Send + Sync>;

/// A name → constructor registry.
#[derive(Default)]
pub struct DriverFactory {
    constructors: AHashMap<String, DriverConstructor>,
}

impl DriverFactory {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: AHashMap::new(),
        }
    }

    /// Register a constructor under `name`, overwriting any prior
    /// registration for that name.
    pub fn register(&mut self, name: impl Into<String>, ctor: DriverConstructor) {
        self.constructors.insert(name.into(), ctor);
    }

    /// Construct the driver registered as `name`, wrapped in a
    /// [`TimedDriver`] that reports to `measurements`.
    ///
    /// Returns `None` if `name` is not registered — callers translate this
    /// into the harness's "unknown DB name" nonzero exit.
    pub fn create(
        &self,
        name: &str,
        props: &Properties,
        measurements: Arc<Measurements>,
    ) -> Option<Result<TimedDriver>> {
        let ctor = self.constructors.get(name)?;
        Some(ctor(props).map(|inner| TimedDriver::new(inner, measurements)))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::TimestampValue;

    /// A driver that fails every write with `ContentionError` and every read
    /// with `NotFound`, used to verify `TimedDriver` never reports a
    /// non-`Ok` call to `Measurements`.
    struct AlwaysContendedDb;

    impl Driver for AlwaysContendedDb {
        fn init(&self) -> Result<()> {
            Ok(())
        }
        fn cleanup(&self) -> Result<()> {
            Ok(())
        }
        fn read(&self, _table: DataTable, _key: &KeyRef) -> (Vec<TimestampValue>, Status) {
            (vec![], Status::NotFound)
        }
        fn update(&self, _table: DataTable, _key: &KeyRef, _value: &TimestampValue) -> Status {
            Status::ContentionError
        }
        fn insert(&self, _table: DataTable, _key: &KeyRef, _value: &TimestampValue) -> Status {
            Status::ContentionError
        }
        fn delete(&self, _table: DataTable, _key: &KeyRef, _value: &TimestampValue) -> Status {
            Status::ContentionError
        }
        fn scan(&self, _table: DataTable, _key: &KeyRef, _n: usize) -> (Vec<TimestampValue>, Status) {
            (vec![], Status::NotImplemented)
        }
        fn batch_insert(&self, _table: DataTable, _keys: &[KeyRef], _values: &[TimestampValue]) -> Status {
            Status::ContentionError
        }
        fn batch_read(
            &self,
            _table: DataTable,
            _floor_key: &str,
            _ceiling_key: &str,
            _n: usize,
        ) -> Result<Vec<(Edge, TimestampValue)>, Status> {
            Err(Status::ContentionError)
        }
        fn execute_transaction(&self, _ops: &Transaction, _read_only: bool) -> Status {
            Status::ContentionError
        }
    }

    fn key() -> KeyRef {
        KeyRef::Object("0:t:0:0".to_string())
    }

    fn value() -> TimestampValue {
        TimestampValue::new(1, vec![b'a'; 4])
    }

    #[test]
    fn failed_insert_is_not_reported_to_measurements() {
        let measurements = Arc::new(Measurements::new());
        let driver = TimedDriver::new(Box::new(AlwaysContendedDb), measurements.clone());

        for _ in 0..10 {
            let status = driver.insert(DataTable::Objects, &key(), &value());
            assert_eq!(status, Status::ContentionError);
        }

        assert_eq!(measurements.count(OpKind::Insert), 0);
    }

    #[test]
    fn failed_read_is_not_reported_to_measurements() {
        let measurements = Arc::new(Measurements::new());
        let driver = TimedDriver::new(Box::new(AlwaysContendedDb), measurements.clone());

        let _ = driver.read(DataTable::Objects, &key());

        assert_eq!(measurements.count(OpKind::Read), 0);
    }

    #[test]
    fn failed_transaction_is_not_reported_to_measurements() {
        let measurements = Arc::new(Measurements::new());
        let driver = TimedDriver::new(Box::new(AlwaysContendedDb), measurements.clone());

        let ops: Transaction = vec![Operation::write(
            DataTable::Objects,
            key(),
            OpKind::Insert,
            value(),
        )];
        let status = driver.execute_transaction(&ops, false);

        assert_eq!(status, Status::ContentionError);
        assert_eq!(measurements.count(OpKind::WriteTransaction), 0);
    }

    #[test]
    fn successful_call_is_reported_to_measurements() {
        use crate::testdb::TestDb;

        let measurements = Arc::new(Measurements::new());
        let driver = TimedDriver::new(Box::new(TestDb::new()), measurements.clone());

        let status = driver.insert(DataTable::Objects, &key(), &value());
        assert_eq!(status, Status::Ok);
        assert_eq!(measurements.count(OpKind::Insert), 1);
    }
}
