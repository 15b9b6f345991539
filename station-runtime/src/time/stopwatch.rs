//! Stopwatch for tracking task and iteration elapsed time.
//!
//! Combines a wall-clock timestamp (for display / persistence) with a
//! monotonic [`Instant`] (for the actual elapsed-time computation), the
//! same split the teacher's stopwatch uses so that elapsed time is never
//! perturbed by a system clock adjustment mid-run.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

#[derive(Clone, Debug)]
pub struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// `T_ELAPSED`: completion minus start, via the monotonic clock.
    pub fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            elapsed: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StopwatchSnapshot {
    pub start_time: DateTime<Local>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn elapsed_is_nonnegative_and_monotonic() {
        let start = stopwatch();
        sleep(Duration::from_millis(5));
        let snap = start.snapshot();
        assert!(snap.elapsed >= Duration::from_millis(5));
    }
}
