//! Per-op-type atomic counters, min/max/sum, and an optional full latency
//! log.
//!
//! Uses `std::sync::atomic` arrays indexed by [`OpKind`] rather than a
//! single lock, so reporting never blocks across op kinds. The latency
//! vector is the one place a lock is genuinely needed, so it stays a
//! `parking_lot::Mutex`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::status::OpKind;

struct Counters {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    latencies: Mutex<Vec<u64>>,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
        }
    }
}

impl Counters {
    fn report(&self, latency_nanos: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(latency_nanos, Ordering::Relaxed);
        self.min.fetch_min(latency_nanos, Ordering::Relaxed);
        self.max.fetch_max(latency_nanos, Ordering::Relaxed);
        self.latencies.lock().push(latency_nanos);
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
        self.latencies.lock().clear();
    }

    fn count_value(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn avg(&self) -> f64 {
        let count = self.count_value();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    fn min_value(&self) -> u64 {
        let v = self.min.load(Ordering::Relaxed);
        if v == u64::MAX {
            0
        } else {
            v
        }
    }

    fn max_value(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }
}

/// Process-wide measurement singleton; one [`Counters`] slot per
/// [`OpKind`]. Reset at the start of each experiment and again once the
/// warmup window expires.
pub struct Measurements {
    counters: [Counters; OpKind::COUNT],
}

impl Default for Measurements {
    fn default() -> Self {
        Self::new()
    }
}

impl Measurements {
    /// Construct a fresh, zeroed set of counters.
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| Counters::default()),
        }
    }

    fn slot(&self, kind: OpKind) -> &Counters {
        &self.counters[kind as usize]
    }

    /// Record one completed op's latency under `kind`.
    pub fn report(&self, kind: OpKind, latency_nanos: u64) {
        self.slot(kind).report(latency_nanos);
    }

    /// Number of ops reported under `kind` since the last reset.
    pub fn count(&self, kind: OpKind) -> u64 {
        self.slot(kind).count_value()
    }

    /// Total ops reported across every kind since the last reset.
    pub fn total_num_ops(&self) -> u64 {
        OpKind::ALL.iter().map(|&k| self.count(k)).sum()
    }

    /// Clears every counter and latency vector.
    pub fn reset(&self) {
        for kind in OpKind::ALL {
            self.slot(kind).reset();
        }
    }

    /// Per-kind "Count / Max / Min / Avg" lines plus an aggregate "WRITE"
    /// roll-up over {Insert, Update, Delete}.
    pub fn status_message(&self) -> String {
        let mut out = String::new();
        for kind in OpKind::ALL {
            let c = self.slot(kind);
            out.push_str(&format!(
                "{kind}: Count={} Max={} Min={} Avg={:.2}\n",
                c.count_value(),
                c.max_value(),
                c.min_value(),
                c.avg()
            ));
        }

        let write_count: u64 = [OpKind::Insert, OpKind::Update, OpKind::Delete]
            .iter()
            .map(|&k| self.count(k))
            .sum();
        let write_sum: u64 = [OpKind::Insert, OpKind::Update, OpKind::Delete]
            .iter()
            .map(|&k| self.slot(k).sum.load(Ordering::Relaxed))
            .sum();
        let write_avg = if write_count == 0 {
            0.0
        } else {
            write_sum as f64 / write_count as f64
        };
        out.push_str(&format!("WRITE: Count={write_count} Avg={write_avg:.2}\n"));
        out
    }

    /// Dumps each kind's latency vector to
    /// `<out_dir>/<Kind>_<epoch_millis>.txt`, one nanosecond latency per
    /// line. Returns the written file paths.
    pub fn write_latencies(&self, out_dir: &Path, epoch_millis: u128) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("creating latency output directory {}", out_dir.display()))?;
        let mut paths = Vec::new();
        for kind in OpKind::ALL {
            let path = out_dir.join(format!("{kind}_{epoch_millis}.txt"));
            let latencies = self.slot(kind).latencies.lock();
            if latencies.is_empty() {
                continue;
            }
            let mut file = fs::File::create(&path)
                .with_context(|| format!("creating latency file {}", path.display()))?;
            for latency in latencies.iter() {
                writeln!(file, "{latency}")?;
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_then_status_reflects_call_count() {
        let m = Measurements::new();
        for _ in 0..5 {
            m.report(OpKind::Read, 100);
        }
        assert_eq!(m.count(OpKind::Read), 5);
        assert!(m.status_message().contains("READ: Count=5"));
    }

    #[test]
    fn reset_zeroes_all_counts() {
        let m = Measurements::new();
        m.report(OpKind::Insert, 50);
        m.report(OpKind::Delete, 80);
        m.reset();
        assert_eq!(m.total_num_ops(), 0);
        assert_eq!(m.count(OpKind::Insert), 0);
    }

    #[test]
    fn min_and_max_track_extremes() {
        let m = Measurements::new();
        m.report(OpKind::Update, 300);
        m.report(OpKind::Update, 100);
        m.report(OpKind::Update, 500);
        assert_eq!(m.slot(OpKind::Update).min_value(), 100);
        assert_eq!(m.slot(OpKind::Update).max_value(), 500);
    }
}
