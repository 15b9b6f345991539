//! A scheduled call against a worker's owned resource (§3 "Task").

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::time::Duration;

/// The outcome slot of a [`Task`]. `Pending` is distinct from `Returned(Null)`
/// so that `is_done` does not mistake "returned nothing" for "not run yet".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Pending,
    Returned(Value),
    Raised(String),
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }
}

/// One scheduled invocation: method name, args, kwargs, the wall-clock time
/// it should fire, and its result slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub execute_at: DateTime<Local>,
    /// Strictly increasing within one worker's schedule; resets only when
    /// the heap is fully cleared. Breaks ties on `execute_at`.
    pub insertion_counter: u64,
    /// Identifies the issuing `Promise`. Lets a promise recognise and
    /// discard a stray result from a promise it superseded (e.g. one left
    /// in flight by cancellation).
    pub batch_id: u64,
    pub outcome: TaskOutcome,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl Task {
    pub fn new(
        method: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        execute_at: DateTime<Local>,
        insertion_counter: u64,
        batch_id: u64,
    ) -> Self {
        Self {
            method: method.into(),
            args,
            kwargs,
            execute_at,
            insertion_counter,
            batch_id,
            outcome: TaskOutcome::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_done()
    }

    /// `t_elapsed = t_done - t_started`, per the universal invariant in §8.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        (finished - started).to_std().ok()
    }

    pub fn mark_started(&mut self, now: DateTime<Local>) {
        self.started_at = Some(now);
    }

    pub fn mark_returned(&mut self, value: Value, now: DateTime<Local>) {
        self.outcome = TaskOutcome::Returned(value);
        self.finished_at = Some(now);
    }

    pub fn mark_raised(&mut self, reason: impl Into<String>, now: DateTime<Local>) {
        self.outcome = TaskOutcome::Raised(reason.into());
        self.finished_at = Some(now);
    }
}

/// Ordering key for the worker's scheduling heap: earliest `execute_at`
/// first, ties broken by insertion order (FIFO on time-ties).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleKey {
    pub execute_at: DateTime<Local>,
    pub insertion_counter: u64,
}

impl Ord for ScheduleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so that `BinaryHeap` (a max-heap) pops the earliest key.
        other
            .execute_at
            .cmp(&self.execute_at)
            .then_with(|| other.insertion_counter.cmp(&self.insertion_counter))
    }
}

impl PartialOrd for ScheduleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub(crate) struct ScheduledTask {
    pub key: ScheduleKey,
    pub task: Task,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for ScheduledTask {}
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn at(ms: i64) -> DateTime<Local> {
        Local::now() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn heap_pops_earliest_execute_at_first() {
        let mut heap = BinaryHeap::new();
        heap.push(ScheduledTask {
            key: ScheduleKey {
                execute_at: at(30),
                insertion_counter: 1,
            },
            task: Task::new("a", vec![], Map::new(), at(30), 1, 0),
        });
        heap.push(ScheduledTask {
            key: ScheduleKey {
                execute_at: at(10),
                insertion_counter: 2,
            },
            task: Task::new("b", vec![], Map::new(), at(10), 2, 0),
        });
        let first = heap.pop().unwrap();
        assert_eq!(first.task.method, "b");
    }

    #[test]
    fn ties_broken_by_insertion_counter() {
        let t = at(0);
        let mut heap = BinaryHeap::new();
        heap.push(ScheduledTask {
            key: ScheduleKey {
                execute_at: t,
                insertion_counter: 5,
            },
            task: Task::new("later", vec![], Map::new(), t, 5, 0),
        });
        heap.push(ScheduledTask {
            key: ScheduleKey {
                execute_at: t,
                insertion_counter: 2,
            },
            task: Task::new("earlier", vec![], Map::new(), t, 2, 0),
        });
        assert_eq!(heap.pop().unwrap().task.method, "earlier");
    }

    #[test]
    fn is_done_distinguishes_pending_from_returned_null() {
        let mut t = Task::new("f", vec![], Map::new(), Local::now(), 0, 0);
        assert!(!t.is_done());
        t.mark_returned(Value::Null, Local::now());
        assert!(t.is_done());
    }
}
