//! The caller-facing handle to one or more in-flight [`Task`]s (§3
//! "Promise", §4.4).

use crate::actor::{CancelToken, Task, TaskOutcome};
use crate::channel::DuplexChannel;
use crate::errors::{ChannelError, PromiseError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::runtime::{ProxyShared, mark_no_longer_outstanding};

#[derive(Debug, PartialEq)]
enum PromiseState {
    Pending,
    Resolved,
    Cancelled,
}

/// Outcome of one [`Promise::recv_one`] step.
enum Step {
    Collected,
    Stray,
}

/// A set of one or more tasks issued together. Resolves to the single
/// task's value if `len() == 1`, else to the list in execution order.
pub struct Promise {
    shared: Arc<ProxyShared>,
    batch_id: u64,
    expected: usize,
    collected: Vec<Value>,
    state: PromiseState,
}

impl Promise {
    pub(super) fn new(shared: Arc<ProxyShared>, batch_id: u64, expected: usize) -> Self {
        Self {
            shared,
            batch_id,
            expected,
            collected: Vec::new(),
            state: PromiseState::Pending,
        }
    }

    pub fn resolved(&self) -> bool {
        self.state == PromiseState::Resolved
    }

    pub fn cancelled(&self) -> bool {
        self.state == PromiseState::Cancelled
    }

    /// Blocks until every constituent task has a result, or `timeout`
    /// elapses. A zero timeout on an unresolved promise fails immediately
    /// (§8 boundary behaviour).
    pub async fn resolve(&mut self, timeout: Option<Duration>) -> Result<PromiseValue, PromiseError> {
        match self.state {
            PromiseState::Resolved => return Ok(self.snapshot()),
            PromiseState::Cancelled => return Err(PromiseError::Cancelled),
            PromiseState::Pending => {}
        }

        if timeout == Some(Duration::ZERO) && self.collected.len() < self.expected {
            return Err(PromiseError::Timeout);
        }

        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        while self.collected.len() < self.expected {
            let remaining = match deadline {
                Some(d) => {
                    let now = tokio::time::Instant::now();
                    if now >= d {
                        return Err(PromiseError::Timeout);
                    }
                    Some(d - now)
                }
                None => None,
            };
            self.recv_one(remaining).await?;
        }

        Ok(self.snapshot())
    }

    /// Blocks until exactly one additional task's result is available, or
    /// returns `Ok(None)` once every expected result has already been
    /// collected. Only valid for a promise built from more than one task.
    pub async fn next(&mut self) -> Result<Option<Value>, PromiseError> {
        if self.expected <= 1 {
            return Err(PromiseError::NotIterable);
        }
        if self.collected.len() >= self.expected {
            return Ok(None);
        }
        let before = self.collected.len();
        loop {
            match self.recv_one(None).await? {
                Step::Collected => break,
                Step::Stray => continue,
            }
        }
        Ok(self.collected.get(before).cloned())
    }

    /// One step of the receive loop: reads exactly one frame off the shared
    /// channel and classifies it. Shared by `resolve` (loop until `expected`
    /// results are in) and `next` (loop until exactly one more is in) so
    /// neither can silently drain results the other would have returned.
    async fn recv_one(&mut self, remaining: Option<Duration>) -> Result<Step, PromiseError> {
        if self.shared.cancel_matches(self.batch_id) {
            self.state = PromiseState::Cancelled;
            mark_no_longer_outstanding(&self.shared, self.batch_id);
            return Err(PromiseError::Cancelled);
        }

        let task = {
            let mut channel: tokio::sync::MutexGuard<'_, DuplexChannel<Task>> =
                self.shared.channel.lock().await;
            channel.get(remaining).await
        };

        match task {
            Ok(task) if task.batch_id == self.batch_id => match task.outcome {
                TaskOutcome::Returned(value) => {
                    self.collected.push(value);
                    if self.collected.len() == self.expected {
                        self.state = PromiseState::Resolved;
                        mark_no_longer_outstanding(&self.shared, self.batch_id);
                    }
                    Ok(Step::Collected)
                }
                TaskOutcome::Raised(reason) => {
                    mark_no_longer_outstanding(&self.shared, self.batch_id);
                    if reason == crate::errors::Cancelled.to_string() {
                        self.state = PromiseState::Cancelled;
                        return Err(PromiseError::Cancelled);
                    }
                    Err(PromiseError::Raised(reason))
                }
                TaskOutcome::Pending => unreachable!("worker only emits completed tasks"),
            },
            // A stray result from a promise this one superseded (e.g. a
            // cancelled promise's in-flight task completing late).
            Ok(_) => Ok(Step::Stray),
            Err(ChannelError::Empty) => Err(PromiseError::Timeout),
            Err(ChannelError::SentinelReceived) | Err(ChannelError::ConnectionClosed) => {
                Err(PromiseError::Raised("worker channel closed".to_string()))
            }
        }
    }

    fn snapshot(&self) -> PromiseValue {
        if self.expected == 1 {
            PromiseValue::Scalar(self.collected[0].clone())
        } else {
            PromiseValue::List(self.collected.clone())
        }
    }

    pub(super) fn cancel_token(&self) -> &CancelToken {
        &self.shared.cancel
    }
}

/// The resolved value of a [`Promise`]: a bare scalar for a single-task
/// promise, or an ordered list for a multi-task one.
#[derive(Clone, Debug, PartialEq)]
pub enum PromiseValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl PromiseValue {
    pub fn into_scalar(self) -> Result<Value, PromiseError> {
        match self {
            PromiseValue::Scalar(v) => Ok(v),
            PromiseValue::List(_) => Err(PromiseError::NotIterable),
        }
    }

    pub fn into_list(self) -> Vec<Value> {
        match self {
            PromiseValue::Scalar(v) => vec![v],
            PromiseValue::List(v) => v,
        }
    }
}
