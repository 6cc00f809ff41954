//! Rate-paced worker loop: one thread's share of an experiment.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::constants::TIMEOUT_LIMIT_SECONDS;
use crate::driver::Driver;
use crate::keypool::KeyPool;
use crate::workload::Workload;

/// A synchronization latch that blocks until `count` independent
/// `count_down` calls have landed, or a timeout elapses.
pub struct CountDownLatch {
    state: Mutex<usize>,
    condvar: Condvar,
}

impl CountDownLatch {
    /// Create a latch that opens once `count` decrements have landed.
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    /// Decrement the latch, waking any waiter once it reaches zero.
    pub fn count_down(&self) {
        let mut remaining = self.state.lock();
        if *remaining > 0 {
            *remaining -= 1;
        }
        if *remaining == 0 {
            self.condvar.notify_all();
        }
    }

    /// Block until the latch reaches zero or `timeout` elapses. Returns
    /// `true` if the latch opened, `false` on timeout.
    pub fn await_for(&self, timeout: Duration) -> bool {
        let mut remaining = self.state.lock();
        let deadline = Instant::now() + timeout;
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.condvar.wait_for(&mut remaining, deadline - now);
            if result.timed_out() && *remaining > 0 {
                return false;
            }
        }
        true
    }

    /// Current outstanding count.
    pub fn count(&self) -> usize {
        *self.state.lock()
    }
}

/// Per-worker outcome returned when a rate-paced loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientThreadInfo {
    /// Ops for which `nextRequest` reported success.
    pub completed_ops: u64,
    /// Iterations that ran over their per-op time budget.
    pub overtime_ops: u64,
    /// Ops for which `nextRequest` reported failure.
    pub failed_ops: u64,
}

/// Runs one worker's rate-paced request loop against `driver`/`workload`
/// for up to `num_ops` iterations (or until `experiment_start.elapsed()`
/// exceeds [`TIMEOUT_LIMIT_SECONDS`]), then decrements `latch`.
///
/// `target_throughput_per_thread` must be strictly positive. When
/// `sleep_on_wait` is true the worker sleeps out any remaining per-op
/// budget; otherwise it busy-waits (`-spin`).
#[allow(clippy::too_many_arguments)]
pub fn run_worker<D: Driver, W: Workload>(
    driver: &D,
    workload: &W,
    pool: &KeyPool,
    num_ops: u64,
    target_throughput_per_thread: f64,
    sleep_on_wait: bool,
    experiment_start: Instant,
    latch: &CountDownLatch,
) -> ClientThreadInfo {
    assert!(
        target_throughput_per_thread > 0.0,
        "target throughput must be strictly positive"
    );
    let nanos_per_op = (1e9 / target_throughput_per_thread) as u64;
    assert!(nanos_per_op > 0, "nanos_per_op must be strictly positive");

    let startup_jitter = rand::thread_rng().gen_range(5_000..nanos_per_op.max(5_001));
    std::thread::sleep(Duration::from_nanos(startup_jitter));

    let mut info = ClientThreadInfo::default();
    let timeout = Duration::from_secs_f64(TIMEOUT_LIMIT_SECONDS);

    for _ in 0..num_ops {
        let op_start = Instant::now();

        if workload.next_request(pool, driver) {
            info.completed_ops += 1;
        } else {
            info.failed_ops += 1;
        }

        let elapsed = op_start.elapsed();
        if experiment_start.elapsed() >= timeout {
            break;
        }

        let elapsed_nanos = elapsed.as_nanos() as i64;
        let remaining_budget = nanos_per_op as i64 - elapsed_nanos;
        if remaining_budget < 0 {
            info.overtime_ops += 1;
        } else if sleep_on_wait {
            std::thread::sleep(Duration::from_nanos(remaining_budget as u64));
        } else {
            let deadline = op_start + Duration::from_nanos(nanos_per_op);
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        }
    }

    latch.count_down();
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn latch_opens_after_all_count_downs() {
        let latch = Arc::new(CountDownLatch::new(3));
        for _ in 0..3 {
            let latch = latch.clone();
            thread::spawn(move || latch.count_down()).join().unwrap();
        }
        assert!(latch.await_for(Duration::from_secs(1)));
        assert_eq!(latch.count(), 0);
    }

    #[test]
    fn latch_times_out_when_undercounted() {
        let latch = CountDownLatch::new(2);
        latch.count_down();
        assert!(!latch.await_for(Duration::from_millis(50)));
    }
}
