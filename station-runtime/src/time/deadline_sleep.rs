//! A sleep future the [`ActorWorker`](crate::actor::ActorWorker) run loop
//! uses to wait for the next scheduled task (or forever, if none is
//! scheduled) without busy-waiting.

use pin_project_lite::pin_project;
use std::{future::Future, pin::Pin, task::Poll, time::Duration};
use tokio::time::{Instant, Sleep};

/// Maximum fudge subtracted from the wait-for-next-task timeout so the
/// worker wakes up just ahead of the deadline instead of slightly after it.
/// Fixed and small, per the design notes: "chosen to balance wake-up
/// precision against busy-wait".
pub const WAKE_EPSILON: Duration = Duration::from_millis(1);

pub fn deadline_sleep(deadline: Option<Instant>) -> DeadlineSleep {
    DeadlineSleep::new(deadline)
}

pin_project! {
    /// Sleeps until `deadline`, or forever if `deadline` is `None`.
    pub struct DeadlineSleep {
        #[pin]
        sleep: Sleep,
        has_deadline: bool,
    }
}

impl DeadlineSleep {
    fn new(deadline: Option<Instant>) -> Self {
        match deadline {
            Some(at) => {
                let now = Instant::now();
                let wake_at = at.checked_sub(WAKE_EPSILON).unwrap_or(now).max(now);
                Self {
                    sleep: tokio::time::sleep_until(wake_at),
                    has_deadline: true,
                }
            }
            None => Self {
                sleep: tokio::time::sleep(far_future_duration()),
                has_deadline: false,
            },
        }
    }

    pub fn has_deadline(&self) -> bool {
        self.has_deadline
    }
}

impl Future for DeadlineSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        self.project().sleep.poll(cx)
    }
}

fn far_future_duration() -> Duration {
    // No scheduled task: park the worker effectively forever, rather than
    // special-casing "no deadline" with an `Option<Sleep>` at every poll site.
    Duration::from_secs(86400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_near_deadline() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let started = Instant::now();
        deadline_sleep(Some(deadline)).await;
        assert!(started.elapsed() >= Duration::from_millis(19));
        assert!(started.elapsed() < Duration::from_millis(80));
    }

    #[tokio::test]
    async fn past_deadline_returns_immediately() {
        let deadline = Instant::now() - Duration::from_millis(5);
        let started = Instant::now();
        deadline_sleep(Some(deadline)).await;
        assert!(started.elapsed() < Duration::from_millis(30));
    }
}
