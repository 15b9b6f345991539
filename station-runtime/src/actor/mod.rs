//! The actor side of the runtime (§4.3): a resource owned by one worker
//! task, reachable only through its [`DuplexChannel`](crate::channel::DuplexChannel).

mod task;
mod worker;

pub use task::{ScheduleKey, Task, TaskOutcome};
pub use worker::{ActorWorker, WorkerState};

use crate::errors::Cancelled;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The cancel flag shared between a [`crate::proxy::Proxy`] and the
/// `ActorWorker` servicing it.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Called periodically from inside a long-running resource method.
    pub fn check_cancel(&self) -> Result<(), Cancelled> {
        if self.is_set() { Err(Cancelled) } else { Ok(()) }
    }
}

/// The resource side of an actor. Implemented (by a generated wrapper, see
/// [`crate::expose_actor`]) for every type spawned behind a proxy; `dispatch`
/// is the single entry point the worker uses to invoke an exposed method by
/// name.
pub trait Actor: Send + 'static {
    fn dispatch(
        &mut self,
        method: &str,
        args: &[Value],
        kwargs: &Map<String, Value>,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = Result<Value, String>> + Send;
}

/// Declares `$Resource`'s exposed method set, generating:
/// - an `Actor` impl whose `dispatch` matches on method name and deserialises
///   args positionally (only the names listed here are reachable);
/// - a `$Proxy` newtype wrapping [`crate::proxy::Proxy<$Resource>`] with one
///   inherent method per exposed name, returning a
///   [`crate::proxy::Call`](crate::proxy::Call) builder.
///
/// Each named method on `$resource` must have the signature
/// `async fn $method(&mut self, $($arg: $arg_ty),*, cancel: &CancelToken) ->
/// Result<$ret, String>` — the cancel token is threaded through explicitly so
/// a long-running method can poll `cancel.check_cancel()` at its own cadence.
///
/// Non-exposed methods on `$Resource` are simply never matched in `dispatch`
/// and have no corresponding method on `$Proxy` — the proxy surface is fixed
/// at compile time by what this macro emits, not by a runtime allow-list.
#[macro_export]
macro_rules! expose_actor {
    (
        resource: $resource:ty,
        proxy: $proxy:ident,
        methods: {
            $( fn $method:ident ( $( $arg:ident : $arg_ty:ty ),* $(,)? ) -> $ret:ty ; )*
        }
    ) => {
        impl $crate::actor::Actor for $resource {
            async fn dispatch(
                &mut self,
                method: &str,
                args: &[::serde_json::Value],
                _kwargs: &::serde_json::Map<String, ::serde_json::Value>,
                cancel: &$crate::actor::CancelToken,
            ) -> Result<::serde_json::Value, String> {
                match method {
                    $(
                        stringify!($method) => {
                            let mut __args = args.iter();
                            $(
                                let $arg: $arg_ty = ::serde_json::from_value(
                                    __args.next().cloned().unwrap_or(::serde_json::Value::Null)
                                ).map_err(|e| e.to_string())?;
                            )*
                            let result: $ret = self.$method($($arg,)* cancel).await?;
                            ::serde_json::to_value(result).map_err(|e| e.to_string())
                        }
                    )*
                    other => Err(format!("{other} is not an exposed method")),
                }
            }
        }

        pub struct $proxy {
            inner: $crate::proxy::Proxy<$resource>,
        }

        impl $proxy {
            pub fn new(inner: $crate::proxy::Proxy<$resource>) -> Self {
                Self { inner }
            }

            pub async fn join(self) -> $resource {
                self.inner.join().await
            }

            pub fn cancel(&self) {
                self.inner.cancel();
            }

            $(
                pub fn $method(&mut self, $($arg: $arg_ty),*) -> $crate::proxy::Call<'_, $resource> {
                    let args = vec![ $( ::serde_json::to_value($arg).expect("argument must serialise") ),* ];
                    self.inner.call(stringify!($method), args)
                }
            )*
        }
    };
}
