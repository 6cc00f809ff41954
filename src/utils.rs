//! Small free functions shared across the loader, workload and worker
//! modules: wall-clock timestamps and the fixed-size random value
//! generator.

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in signed nanoseconds since the Unix epoch.
pub fn current_time_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_nanos() as i64
}

/// A fixed-length byte vector of exactly `size` bytes drawn uniformly from
/// `[a-z]`.
pub fn random_value(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

/// An alphanumeric tag unique enough to disambiguate keys generated by
/// different threads/processes sharing a shard. Not parsed by any
/// invariant; only the shard prefix is load-bearing.
pub fn random_thread_tag() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_value_has_exact_length_and_alphabet() {
        let v = random_value(150);
        assert_eq!(v.len(), 150);
        assert!(v.iter().all(|&b| (b'a'..=b'z').contains(&b)));
    }

    #[test]
    fn current_time_nanos_is_monotonic_enough() {
        let a = current_time_nanos();
        let b = current_time_nanos();
        assert!(b >= a);
    }
}
