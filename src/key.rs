//! Key and operation shapes consumed by [`crate::driver::Driver`].

use crate::edge::EdgeType;
use crate::status::{DataTable, OpKind};

/// A row key, either a single object id or an edge triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRef {
    /// An objects-table key: a single id.
    Object(String),
    /// An edges-table key: (id1, id2, type).
    Edge(String, String, EdgeType),
}

impl KeyRef {
    /// The shard this key's primary id was assigned to: the integer
    /// prefix of the id before the first `:`.
    pub fn shard(&self) -> anyhow::Result<u8> {
        let id = match self {
            KeyRef::Object(id) => id,
            KeyRef::Edge(id1, _, _) => id1,
        };
        shard_of(id)
    }
}

/// Splits `id` on the first `:` and parses the prefix as a shard id.
pub fn shard_of(id: &str) -> anyhow::Result<u8> {
    let prefix = id
        .split(':')
        .next()
        .ok_or_else(|| anyhow::anyhow!("malformed id, no ':' separator: {id}"))?;
    Ok(prefix.parse()?)
}

/// A timestamped record value. `timestamp` is signed wall-clock
/// nanoseconds; `value` is fixed at `VALUE_SIZE_BYTES` for generated rows.
#[derive(Debug, Clone)]
pub struct TimestampValue {
    /// Wall-clock nanoseconds since epoch.
    pub timestamp: i64,
    /// Opaque record payload.
    pub value: Vec<u8>,
}

impl TimestampValue {
    /// Construct a new timestamp/value pair.
    pub fn new(timestamp: i64, value: Vec<u8>) -> Self {
        Self { timestamp, value }
    }
}

/// A single request against a [`crate::driver::Driver`].
#[derive(Debug, Clone)]
pub struct Operation {
    /// Table the operation addresses.
    pub table: DataTable,
    /// Row key: one element for Objects, three (id1, id2, type) for Edges.
    pub key: KeyRef,
    /// Which single-op kind this is. Never a transaction kind.
    pub kind: OpKind,
    /// Present for writes (Insert/Update/Delete); absent for Read/Scan.
    pub value: Option<TimestampValue>,
}

impl Operation {
    /// Build a read operation.
    pub fn read(table: DataTable, key: KeyRef) -> Self {
        Self {
            table,
            key,
            kind: OpKind::Read,
            value: None,
        }
    }

    /// Build a write operation (insert/update/delete) carrying `value`.
    pub fn write(table: DataTable, key: KeyRef, kind: OpKind, value: TimestampValue) -> Self {
        debug_assert!(matches!(
            kind,
            OpKind::Insert | OpKind::Update | OpKind::Delete
        ));
        Self {
            table,
            key,
            kind,
            value: Some(value),
        }
    }
}

/// An ordered, non-empty, homogeneous (all-read or all-write) sequence of
/// operations executed atomically by [`crate::driver::Driver::execute_transaction`].
pub type Transaction = Vec<Operation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_parses_leading_prefix() {
        assert_eq!(shard_of("3:tag:7:12345").unwrap(), 3);
    }

    #[test]
    fn shard_ignores_remaining_colons() {
        assert_eq!(shard_of("9:Thread(1):0:1").unwrap(), 9);
    }
}
