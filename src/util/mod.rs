//! Module `util` implement helper types shared across the package.

use std::time;

mod spinlock;

pub use spinlock::Spinlock;

/// Milliseconds elapsed since `start`, for humans reading the logs.
pub fn elapsed_msec(start: time::Instant) -> u128 {
    start.elapsed().as_millis()
}
