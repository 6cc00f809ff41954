//! A real in-memory reference [`Driver`], registered under the name
//! `"test"`.
//!
//! Unlike a print-stub that just logs every call, this one actually stores
//! rows and enforces edge-semantics exclusivity (via [`incompatible_keys`])
//! and timestamp monotonicity — so this crate's own tests can exercise
//! realistic scenarios against a real, if trivial, backend.

use ahash::AHashMap as HashMap;
use anyhow::Result;
use parking_lot::Mutex;

use crate::edge::{incompatible_keys, Edge, EdgeType};
use crate::key::{KeyRef, TimestampValue};
use crate::status::{DataTable, Status};

#[derive(Clone)]
struct StoredEdge {
    edge_type: EdgeType,
    value: TimestampValue,
}

/// An in-memory [`Driver`] backed by two `HashMap`s, one per table.
#[derive(Default)]
pub struct TestDb {
    edges: Mutex<HashMap<(String, String), StoredEdge>>,
    objects: Mutex<HashMap<String, TimestampValue>>,
}

impl TestDb {
    /// Construct an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn violates_edge_semantics(edges: &HashMap<(String, String), StoredEdge>, id1: &str, id2: &str, edge_type: EdgeType) -> bool {
        let patterns = incompatible_keys(id1, id2, edge_type);
        edges
            .iter()
            .any(|((a, b), stored)| patterns.iter().any(|p| p.matches(a, b, stored.edge_type)))
    }

    fn insert_edge(&self, id1: &str, id2: &str, edge_type: EdgeType, value: TimestampValue) -> Status {
        let mut edges = self.edges.lock();
        if Self::violates_edge_semantics(&edges, id1, id2, edge_type) {
            return Status::ContentionError;
        }
        edges.insert((id1.to_string(), id2.to_string()), StoredEdge { edge_type, value });
        Status::Ok
    }

    fn insert_object(&self, id: &str, value: TimestampValue) -> Status {
        self.objects.lock().insert(id.to_string(), value);
        Status::Ok
    }
}

impl crate::driver::Driver for TestDb {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, table: DataTable, key: &KeyRef) -> (Vec<TimestampValue>, Status) {
        match (table, key) {
            (DataTable::Objects, KeyRef::Object(id)) => match self.objects.lock().get(id) {
                Some(v) => (vec![v.clone()], Status::Ok),
                None => (vec![], Status::NotFound),
            },
            (DataTable::Edges, KeyRef::Edge(id1, id2, _)) => {
                match self.edges.lock().get(&(id1.clone(), id2.clone())) {
                    Some(e) => (vec![e.value.clone()], Status::Ok),
                    None => (vec![], Status::NotFound),
                }
            }
            _ => (vec![], Status::Error("table/key mismatch".to_string())),
        }
    }

    fn update(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        match (table, key) {
            (DataTable::Objects, KeyRef::Object(id)) => {
                let mut objects = self.objects.lock();
                match objects.get(id) {
                    Some(existing) if value.timestamp <= existing.timestamp => Status::Ok,
                    _ => {
                        objects.insert(id.clone(), value.clone());
                        Status::Ok
                    }
                }
            }
            (DataTable::Edges, KeyRef::Edge(id1, id2, edge_type)) => {
                let mut edges = self.edges.lock();
                let k = (id1.clone(), id2.clone());
                match edges.get(&k) {
                    Some(existing) if value.timestamp <= existing.value.timestamp => Status::Ok,
                    _ => {
                        edges.insert(
                            k,
                            StoredEdge {
                                edge_type: *edge_type,
                                value: value.clone(),
                            },
                        );
                        Status::Ok
                    }
                }
            }
            _ => Status::Error("table/key mismatch".to_string()),
        }
    }

    fn insert(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        match (table, key) {
            (DataTable::Objects, KeyRef::Object(id)) => self.insert_object(id, value.clone()),
            (DataTable::Edges, KeyRef::Edge(id1, id2, edge_type)) => {
                self.insert_edge(id1, id2, *edge_type, value.clone())
            }
            _ => Status::Error("table/key mismatch".to_string()),
        }
    }

    fn delete(&self, table: DataTable, key: &KeyRef, value: &TimestampValue) -> Status {
        match (table, key) {
            (DataTable::Objects, KeyRef::Object(id)) => {
                let mut objects = self.objects.lock();
                if let Some(existing) = objects.get(id) {
                    if value.timestamp > existing.timestamp {
                        objects.remove(id);
                    }
                }
                Status::Ok
            }
            (DataTable::Edges, KeyRef::Edge(id1, id2, _)) => {
                let mut edges = self.edges.lock();
                let k = (id1.clone(), id2.clone());
                if let Some(existing) = edges.get(&k) {
                    if value.timestamp > existing.value.timestamp {
                        edges.remove(&k);
                    }
                }
                Status::Ok
            }
            _ => Status::Error("table/key mismatch".to_string()),
        }
    }

    fn scan(&self, _table: DataTable, _key: &KeyRef, _n: usize) -> (Vec<TimestampValue>, Status) {
        (vec![], Status::NotImplemented)
    }

    fn batch_insert(&self, table: DataTable, keys: &[KeyRef], values: &[TimestampValue]) -> Status {
        for (key, value) in keys.iter().zip(values.iter()) {
            let status = self.insert(table, key, value);
            if !status.is_ok() {
                return status;
            }
        }
        Status::Ok
    }

    fn batch_read(
        &self,
        table: DataTable,
        floor_key: &str,
        ceiling_key: &str,
        n: usize,
    ) -> Result<Vec<(Edge, TimestampValue)>, Status> {
        if table != DataTable::Edges {
            return Err(Status::NotImplemented);
        }
        let edges = self.edges.lock();
        let mut rows: Vec<(Edge, TimestampValue)> = edges
            .iter()
            .filter(|((id1, _), _)| id1.as_str() > floor_key && id1.as_str() < ceiling_key)
            .map(|((id1, id2), stored)| {
                (
                    Edge::new(id1.clone(), id2.clone(), stored.edge_type),
                    stored.value.clone(),
                )
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| (&a.primary_key, &a.remote_key).cmp(&(&b.primary_key, &b.remote_key)));
        rows.truncate(n);
        Ok(rows)
    }

    fn execute_transaction(&self, ops: &crate::key::Transaction, _read_only: bool) -> Status {
        for op in ops {
            let status = self.execute(op);
            if !status.is_ok() {
                return status;
            }
        }
        Status::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::key::TimestampValue;

    fn ts(nanos: i64) -> TimestampValue {
        TimestampValue::new(nanos, vec![b'a'; 4])
    }

    #[test]
    fn insert_then_conflicting_unique_insert_is_rejected() {
        let db = TestDb::new();
        let s1 = db.insert(
            DataTable::Edges,
            &KeyRef::Edge("X".into(), "Y".into(), EdgeType::Unique),
            &ts(1),
        );
        assert_eq!(s1, Status::Ok);

        let s2 = db.insert(
            DataTable::Edges,
            &KeyRef::Edge("X".into(), "Z".into(), EdgeType::Other),
            &ts(2),
        );
        assert_eq!(s2, Status::ContentionError);
    }

    #[test]
    fn bidirectional_then_reverse_other_is_rejected() {
        let db = TestDb::new();
        assert_eq!(
            db.insert(
                DataTable::Edges,
                &KeyRef::Edge("X".into(), "Y".into(), EdgeType::Bidirectional),
                &ts(1)
            ),
            Status::Ok
        );
        assert_eq!(
            db.insert(
                DataTable::Edges,
                &KeyRef::Edge("Y".into(), "X".into(), EdgeType::Other),
                &ts(2)
            ),
            Status::ContentionError
        );
    }

    #[test]
    fn update_with_older_timestamp_is_not_observable() {
        let db = TestDb::new();
        let key = KeyRef::Object("o1".into());
        db.insert(DataTable::Objects, &key, &ts(10));
        db.update(DataTable::Objects, &key, &ts(5));
        let (rows, status) = db.read(DataTable::Objects, &key);
        assert_eq!(status, Status::Ok);
        assert_eq!(rows[0].timestamp, 10);
    }

    #[test]
    fn batch_read_respects_open_interval_and_sorts() {
        let db = TestDb::new();
        for (id1, id2) in [("1:a:0:0", "1:b:0:0"), ("2:a:0:0", "2:b:0:0"), ("3:a:0:0", "3:b:0:0")] {
            db.insert(DataTable::Edges, &KeyRef::Edge(id1.into(), id2.into(), EdgeType::Other), &ts(1));
        }
        let rows = db.batch_read(DataTable::Edges, "1:a:0:0", "3:a:0:0", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.primary_key, "2:a:0:0");
    }
}
