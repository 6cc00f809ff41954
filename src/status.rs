//! Status taxonomy and op-kind tagging shared between the [`crate::driver`]
//! and [`crate::measurements`] modules.

use std::fmt;

/// Outcome of a single call into a [`crate::driver::Driver`].
///
/// Drivers never let an exception escape; every failure mode they can
/// report is a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Success.
    Ok,
    /// The requested row was absent. Legal, never fatal.
    NotFound,
    /// The driver does not implement this operation.
    NotImplemented,
    /// Transient conflict: an aborted transaction, a restart-required read,
    /// or similar. The harness counts these but never retries them itself.
    ContentionError,
    /// Any other failure. Carries a message for the stderr log line.
    Error(String),
}

impl Status {
    /// Whether this status should be counted as a completed, observable op.
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::NotFound => write!(f, "NOT_FOUND"),
            Status::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
            Status::ContentionError => write!(f, "CONTENTION_ERROR"),
            Status::Error(msg) => write!(f, "ERROR: {msg}"),
        }
    }
}

/// The table an [`crate::key::Operation`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTable {
    /// The edges table: rows keyed by (id1, id2, type).
    Edges,
    /// The objects table: rows keyed by a single id.
    Objects,
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTable::Edges => write!(f, "edges"),
            DataTable::Objects => write!(f, "objects"),
        }
    }
}

/// The eight op kinds [`crate::measurements::Measurements`] keeps separate
/// counters for. `ReadModifyWrite` is carried for fidelity with the source
/// taxonomy even though this workload generator never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum OpKind {
    Insert = 0,
    Read = 1,
    Update = 2,
    Scan = 3,
    ReadModifyWrite = 4,
    Delete = 5,
    ReadTransaction = 6,
    WriteTransaction = 7,
}

impl OpKind {
    /// Number of distinct op kinds.
    pub const COUNT: usize = 8;

    /// All op kinds, in the order they're printed in status messages.
    pub const ALL: [OpKind; Self::COUNT] = [
        OpKind::Insert,
        OpKind::Read,
        OpKind::Update,
        OpKind::Scan,
        OpKind::ReadModifyWrite,
        OpKind::Delete,
        OpKind::ReadTransaction,
        OpKind::WriteTransaction,
    ];

    /// Whether this kind rolls up into the aggregate "WRITE" status line.
    pub fn is_write(self) -> bool {
        matches!(self, OpKind::Insert | OpKind::Update | OpKind::Delete)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Insert => "INSERT",
            OpKind::Read => "READ",
            OpKind::Update => "UPDATE",
            OpKind::Scan => "SCAN",
            OpKind::ReadModifyWrite => "READMODIFYWRITE",
            OpKind::Delete => "DELETE",
            OpKind::ReadTransaction => "READTRANSACTION",
            OpKind::WriteTransaction => "WRITETRANSACTION",
        };
        write!(f, "{s}")
    }
}
