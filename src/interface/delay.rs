//! Blocking delays and the bounded poll-with-timeout primitive.
//!
//! The driver has no scheduler: hardware-ready signals are awaited by
//! polling with a deadline. [`poll_deadline`] is the single place that
//! encodes that loop so it can be swapped for a true blocking wait on hosts
//! that support one without touching engine logic.

use std::thread;
use std::time::{Duration, Instant};

/// Interval between ready-signal polls
const POLL_STEP: Duration = Duration::from_millis(1);

/// Pause execution for `ms` milliseconds
pub fn delay_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

/// Pause execution for `us` microseconds
pub fn delay_us(us: u64) {
    thread::sleep(Duration::from_micros(us));
}

/// Poll `ready` every millisecond until it returns true or `timeout`
/// expires. Returns whether the condition was observed.
pub fn poll_deadline(timeout: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if ready() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(POLL_STEP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_deadline_immediate() {
        assert!(poll_deadline(Duration::from_millis(5), || true));
    }

    #[test]
    fn test_poll_deadline_expires() {
        let start = Instant::now();
        assert!(!poll_deadline(Duration::from_millis(10), || false));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_poll_deadline_eventually_ready() {
        let mut calls = 0;
        assert!(poll_deadline(Duration::from_millis(100), || {
            calls += 1;
            calls >= 3
        }));
    }
}
