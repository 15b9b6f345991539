//! `Proxy<R>` and the scheduling-modifier call builder (§4.4).

use crate::actor::{Actor, ActorWorker, CancelToken, Task};
use crate::channel::DuplexChannel;
use crate::errors::PromiseError;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::promise::Promise;

pub(super) struct ProxyShared {
    pub(super) channel: tokio::sync::Mutex<DuplexChannel<Task>>,
    pub(super) cancel: CancelToken,
    outstanding: std::sync::Mutex<Option<u64>>,
    cancelled_batch: std::sync::Mutex<Option<u64>>,
    next_batch_id: AtomicU64,
}

impl ProxyShared {
    pub(super) fn cancel_matches(&self, batch_id: u64) -> bool {
        *self.cancelled_batch.lock().expect("lock poisoned") == Some(batch_id)
    }
}

/// Clears the outstanding flag once a promise is done (resolved or
/// cancelled), allowing the next `issue()` to proceed.
pub(super) fn mark_no_longer_outstanding(shared: &ProxyShared, batch_id: u64) {
    let mut outstanding = shared.outstanding.lock().expect("lock poisoned");
    if *outstanding == Some(batch_id) {
        *outstanding = None;
    }
}

/// A handle to a resource running on a dedicated `ActorWorker`. Holds only
/// the channel endpoint and the cancel flag — never the resource itself.
pub struct Proxy<R: Actor> {
    shared: Arc<ProxyShared>,
    worker: Option<JoinHandle<R>>,
}

impl<R: Actor> Proxy<R> {
    /// Spawns an `ActorWorker` for `resource` and returns a handle to it.
    pub fn spawn(resource: R) -> Self {
        let (parent_end, worker_end): (DuplexChannel<Task>, DuplexChannel<Task>) =
            DuplexChannel::in_process_pair();
        let cancel = CancelToken::new();
        let worker = ActorWorker::new(resource, worker_end, cancel.clone());
        let handle = tokio::spawn(worker.run());

        Self {
            shared: Arc::new(ProxyShared {
                channel: tokio::sync::Mutex::new(parent_end),
                cancel,
                outstanding: std::sync::Mutex::new(None),
                cancelled_batch: std::sync::Mutex::new(None),
                next_batch_id: AtomicU64::new(0),
            }),
            worker: Some(handle),
        }
    }

    /// Cancels outstanding work, drains, joins the worker, and returns the
    /// original owned resource.
    pub async fn join(mut self) -> R {
        self.cancel();
        {
            let mut channel = self.shared.channel.lock().await;
            channel.kill_other().await;
        }
        let handle = self.worker.take().expect("join called twice");
        handle.await.expect("worker task panicked")
    }

    /// Sets the cancel flag. Idempotent; a no-op if nothing is outstanding.
    pub fn cancel(&self) {
        self.shared.cancel.set();
        let outstanding = *self.shared.outstanding.lock().expect("lock poisoned");
        if let Some(batch_id) = outstanding {
            *self.shared.cancelled_batch.lock().expect("lock poisoned") = Some(batch_id);
        }
    }

    pub fn cancel_check(&self) -> bool {
        self.shared.cancel.is_set()
    }

    /// Builds a [`Call`] for `method`. Used by the method wrappers a
    /// [`crate::expose_actor`] invocation generates; not meant to be called
    /// with an arbitrary string by application code.
    pub fn call(&self, method: &'static str, args: Vec<Value>) -> Call<'_, R> {
        Call {
            proxy: self,
            method,
            args,
            modifier: Modifier::Default,
            conflict: None,
        }
    }

    fn try_reserve(&self) -> Result<u64, PromiseError> {
        let mut outstanding = self.shared.outstanding.lock().expect("lock poisoned");
        if outstanding.is_some() {
            return Err(PromiseError::Outstanding);
        }
        let batch_id = self.shared.next_batch_id.fetch_add(1, Ordering::SeqCst);
        *outstanding = Some(batch_id);
        *self.shared.cancelled_batch.lock().expect("lock poisoned") = None;
        Ok(batch_id)
    }
}

enum Modifier {
    Default,
    After(Vec<Duration>, Option<DateTime<Local>>),
    At(Vec<DateTime<Local>>),
    OnInterval(Duration, u32, Option<DateTime<Local>>),
}

/// A fluent builder for one proxy call. At most one scheduling modifier may
/// be applied; combining two fails the eventual `issue()`/`now()` call with
/// `PromiseError::ModifierConflict`.
pub struct Call<'p, R: Actor> {
    proxy: &'p Proxy<R>,
    method: &'static str,
    args: Vec<Value>,
    modifier: Modifier,
    conflict: Option<&'static str>,
}

impl<'p, R: Actor> Call<'p, R> {
    pub fn after(mut self, deltas: Vec<Duration>, from: Option<DateTime<Local>>) -> Self {
        self.set_modifier(Modifier::After(deltas, from));
        self
    }

    pub fn at(mut self, times: Vec<DateTime<Local>>) -> Self {
        self.set_modifier(Modifier::At(times));
        self
    }

    pub fn on_interval(mut self, delta: Duration, n: u32, from: Option<DateTime<Local>>) -> Self {
        self.set_modifier(Modifier::OnInterval(delta, n, from));
        self
    }

    fn set_modifier(&mut self, modifier: Modifier) {
        if !matches!(self.modifier, Modifier::Default) {
            self.conflict = Some("cannot combine scheduling modifiers");
        }
        self.modifier = modifier;
    }

    /// Issue and immediately resolve, blocking the caller until the single
    /// task completes. `.now()` is always exactly one task; combining it
    /// with `.after`/`.at`/`.on_interval` is a `ModifierConflict`, the same
    /// as combining two of those with each other.
    pub async fn now(self) -> Result<Value, PromiseError> {
        if let Some(reason) = self.conflict {
            return Err(PromiseError::ModifierConflict(reason));
        }
        if !matches!(self.modifier, Modifier::Default) {
            return Err(PromiseError::ModifierConflict(
                "cannot combine a scheduling modifier with now()",
            ));
        }
        let mut promise = self.issue_with_times(vec![Local::now()]).await?;
        promise.resolve(None).await.map(|v| v.into_scalar().expect("single task"))
    }

    /// Issue the call per its modifier (or a single immediate task if none
    /// was set) and return the pending promise without resolving it.
    pub async fn issue(self) -> Result<Promise, PromiseError> {
        if let Some(reason) = self.conflict {
            return Err(PromiseError::ModifierConflict(reason));
        }
        let times = match &self.modifier {
            Modifier::Default => vec![Local::now()],
            Modifier::After(deltas, from) => {
                if deltas.is_empty() {
                    return Err(PromiseError::NoTimes);
                }
                let base = from.unwrap_or_else(Local::now);
                deltas
                    .iter()
                    .map(|d| base + chrono::Duration::from_std(*d).unwrap_or_default())
                    .collect()
            }
            Modifier::At(times) => {
                if times.is_empty() {
                    return Err(PromiseError::NoTimes);
                }
                times.clone()
            }
            Modifier::OnInterval(delta, n, from) => {
                if *n == 0 {
                    return Err(PromiseError::NoTimes);
                }
                let base = from.unwrap_or_else(Local::now);
                (1..=*n)
                    .map(|i| {
                        base + chrono::Duration::from_std(*delta).unwrap_or_default() * i as i32
                    })
                    .collect()
            }
        };
        self.issue_with_times(times).await
    }

    async fn issue_with_times(self, times: Vec<DateTime<Local>>) -> Result<Promise, PromiseError> {
        let batch_id = self.proxy.try_reserve()?;
        let mut channel = self.proxy.shared.channel.lock().await;
        for t in &times {
            let task = Task::new(self.method, self.args.clone(), Default::default(), *t, 0, batch_id);
            let _ = channel.put(task).await;
        }
        drop(channel);
        Ok(Promise::new(Arc::clone(&self.proxy.shared), batch_id, times.len()))
    }
}

impl<'p, R: Actor> std::future::IntoFuture for Call<'p, R> {
    type Output = Result<Promise, PromiseError>;
    type IntoFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Self::Output> + Send + 'p>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.issue())
    }
}
