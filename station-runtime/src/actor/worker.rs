//! The worker run loop (§4.3).

use super::task::{ScheduleKey, ScheduledTask, Task};
use super::{Actor, CancelToken};
use crate::channel::DuplexChannel;
use crate::errors::ChannelError;
use crate::registry::{Advice, Registry};
use crate::time::StateMachine;
use chrono::Local;
use std::collections::BinaryHeap;
use tracing::{debug, info, warn};

/// Name under which shutdown advice is registered (§4.3's `on_shutdown`
/// hook).
const ON_SHUTDOWN: &str = "on_shutdown";

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

fn allowed(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
        (from, to),
        (Starting, Running) | (Running, Draining) | (Draining, Stopped)
    )
}

/// Owns `R` and services one [`DuplexChannel`] endpoint of `Task` messages:
/// incoming tasks are scheduled, outgoing tasks carry filled result slots.
pub struct ActorWorker<R: Actor> {
    resource: R,
    channel: DuplexChannel<Task>,
    cancel: CancelToken,
    state: StateMachine<WorkerState>,
    heap: BinaryHeap<ScheduledTask>,
    insertion_counter: u64,
    registry: Registry<R>,
}

impl<R: Actor> ActorWorker<R> {
    pub fn new(resource: R, channel: DuplexChannel<Task>, cancel: CancelToken) -> Self {
        Self {
            resource,
            channel,
            cancel,
            state: StateMachine::new(WorkerState::Starting, allowed),
            heap: BinaryHeap::new(),
            insertion_counter: 0,
            registry: Registry::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state.current()
    }

    /// Registers `advice` to run once draining begins, before the final
    /// sentinel is emitted (§4.3's `on_shutdown` hook). Advice registered
    /// later runs after advice registered earlier, same as any other
    /// `Registry` before-chain.
    pub fn on_shutdown(&mut self, advice: Advice<R>) {
        self.registry.before(ON_SHUTDOWN, advice);
    }

    /// Runs until the channel closes (sentinel or broken link), then returns
    /// the owned resource to the caller (`ProxyRuntime::join`).
    pub async fn run(mut self) -> R {
        self.channel.put_started().await;
        self.state.force_transition(WorkerState::Running);

        loop {
            if self.cancel.is_set() {
                self.heap.clear();
                self.insertion_counter = 0;
                self.cancel.clear();
            }

            let next_deadline = self.heap.peek().map(|st| st.key.execute_at);
            let timeout = next_deadline.map(|deadline| {
                let raw = (deadline - Local::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                raw.saturating_sub(crate::time::WAKE_EPSILON)
            });

            match self.channel.get(timeout).await {
                Ok(mut incoming) => {
                    incoming.insertion_counter = self.insertion_counter;
                    self.insertion_counter += 1;
                    self.heap.push(ScheduledTask {
                        key: ScheduleKey {
                            execute_at: incoming.execute_at,
                            insertion_counter: incoming.insertion_counter,
                        },
                        task: incoming,
                    });
                }
                Err(ChannelError::Empty) => {
                    self.try_execute_due_task().await;
                }
                Err(ChannelError::SentinelReceived) => {
                    debug!("worker received close sentinel");
                    break;
                }
                Err(ChannelError::ConnectionClosed) => {
                    warn!("worker's channel closed");
                    break;
                }
            }
        }

        self.state.force_transition(WorkerState::Draining);
        info!("worker draining");

        let hook = self.registry.finalize(ON_SHUTDOWN);
        if let Err(e) = hook(&mut self.resource, &[], &serde_json::Map::new()) {
            warn!(error = %e, "on_shutdown hook failed");
        }

        self.channel.put_sentinel().await;
        self.state.force_transition(WorkerState::Stopped);
        self.resource
    }

    async fn try_execute_due_task(&mut self) {
        let due = match self.heap.peek() {
            Some(top) if top.key.execute_at <= Local::now() => true,
            _ => false,
        };
        if !due {
            return;
        }
        let mut scheduled = self.heap.pop().expect("peeked Some above");
        let task = &mut scheduled.task;

        task.mark_started(Local::now());
        let result = self
            .resource
            .dispatch(&task.method, &task.args, &task.kwargs, &self.cancel)
            .await;

        let raised = result.is_err();
        match result {
            Ok(value) => task.mark_returned(value, Local::now()),
            Err(reason) => task.mark_raised(reason, Local::now()),
        }

        if raised {
            // A resource-method exception invalidates the rest of this
            // promise's schedule (§4.3: "clear the heap").
            self.heap.clear();
            self.insertion_counter = 0;
        }

        let _ = self.channel.put(scheduled.task).await;
    }
}
