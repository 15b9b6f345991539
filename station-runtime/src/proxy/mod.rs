//! The proxy side of the runtime (§4.4): a handle with the resource's
//! exposed method surface, where every call becomes a [`Task`](crate::actor::Task)
//! and every issue produces a [`Promise`].

mod promise;
mod runtime;

pub use promise::{Promise, PromiseValue};
pub use runtime::{Call, Proxy};

/// Thin, named entry point mirroring the design's `ProxyRuntime` component:
/// a place to spawn, join, and cancel proxies without reaching into
/// `Proxy`'s inherent methods directly. `Proxy<R>` already carries all the
/// state; these are forwarding calls kept for the component's own name.
pub struct ProxyRuntime;

impl ProxyRuntime {
    pub fn spawn<R: crate::actor::Actor>(resource: R) -> Proxy<R> {
        Proxy::spawn(resource)
    }

    pub async fn join<R: crate::actor::Actor>(proxy: Proxy<R>) -> R {
        proxy.join().await
    }

    pub fn cancel<R: crate::actor::Actor>(proxy: &Proxy<R>) {
        proxy.cancel();
    }
}
