//! Declarative before/after advice composition (§4.1).
//!
//! Rust has no runtime MRO to walk, so the "walk the hierarchy, collect
//! annotations, wrap once at finalisation" algorithm becomes: callers
//! register advice explicitly, ancestor-first, into a [`Registry`]; calling
//! [`Registry::finalize`] composes it into a single wrapped callable around
//! the target method, once, idempotently.
//!
//! [`crate::actor::ActorWorker`] registers its `on_shutdown` hook this way
//! (§4.3): callers attach before-advice through `ActorWorker::on_shutdown`,
//! and the worker finalizes and runs the composed chain once, while
//! draining, before the final sentinel goes out.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An advice function: either ignores the call arguments (bare) or receives
/// them verbatim, mirroring the source's "called with the same args as the
/// target, except advice that accepts no extra parameters is called with
/// none".
#[derive(Clone)]
pub enum Advice<T> {
    Bare(Arc<dyn Fn(&mut T) -> Result<(), AdviceError> + Send + Sync>),
    WithArgs(Arc<dyn Fn(&mut T, &[Value], &Map<String, Value>) -> Result<(), AdviceError> + Send + Sync>),
}

impl<T> Advice<T> {
    fn call(&self, target: &mut T, args: &[Value], kwargs: &Map<String, Value>) -> Result<(), AdviceError> {
        match self {
            Advice::Bare(f) => f(target),
            Advice::WithArgs(f) => f(target, args, kwargs),
        }
    }
}

/// Error raised by an advice function. Aborts the remainder of the chain.
#[derive(Debug, Clone)]
pub struct AdviceError(pub String);

impl fmt::Display for AdviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "advice failed: {}", self.0)
    }
}
impl std::error::Error for AdviceError {}

/// Whether `after` advice still runs when the target raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterOnFailure {
    /// Default: `after` advice is skipped if the target raised.
    OnSuccessOnly,
    /// `after_even_on_failure`: run regardless of the target's outcome.
    Always,
}

/// The target method itself.
pub type Target<T> = Arc<dyn Fn(&mut T, &[Value], &Map<String, Value>) -> Result<Value, String> + Send + Sync>;

struct TargetAdvice<T> {
    before: Vec<Advice<T>>,
    after: Vec<(Advice<T>, AfterOnFailure)>,
    target: Target<T>,
}

/// Collects before/after advice per target method name and composes a
/// single wrapper, once.
pub struct Registry<T> {
    targets: HashMap<&'static str, TargetAdvice<T>>,
    composed: HashMap<&'static str, Target<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            targets: HashMap::new(),
            composed: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or overwrite) the target method for `name`. Must be called
    /// before [`finalize`](Self::finalize) for that name.
    pub fn set_target(&mut self, name: &'static str, target: Target<T>) {
        self.entry(name).target = target;
    }

    /// Register before-advice for `name`. Ancestor-first, declaration order
    /// within a class: callers are responsible for calling this in that
    /// order, since there is no hierarchy to walk at runtime.
    pub fn before(&mut self, name: &'static str, advice: Advice<T>) {
        self.entry(name).before.push(advice);
    }

    /// Register after-advice for `name`.
    pub fn after(&mut self, name: &'static str, advice: Advice<T>, on_failure: AfterOnFailure) {
        self.entry(name).after.push((advice, on_failure));
    }

    fn entry(&mut self, name: &'static str) -> &mut TargetAdvice<T> {
        self.targets.entry(name).or_insert_with(|| TargetAdvice {
            before: Vec::new(),
            after: Vec::new(),
            // A placeholder no-op target, installed if `set_target` is never
            // called for this name (mirrors "install a no-op placeholder if
            // none exists").
            target: Arc::new(|_, _, _| Ok(Value::Null)),
        })
    }

    /// Compose the wrapper for `name`, once. A second call is a no-op that
    /// returns the already-composed wrapper (idempotent finalisation).
    pub fn finalize(&mut self, name: &'static str) -> Target<T>
    where
        T: 'static,
    {
        if let Some(existing) = self.composed.get(name) {
            return Arc::clone(existing);
        }

        let Some(spec) = self.targets.remove(name) else {
            // Nothing registered at all: install and cache a no-op.
            let noop: Target<T> = Arc::new(|_, _, _| Ok(Value::Null));
            self.composed.insert(name, Arc::clone(&noop));
            return noop;
        };

        let TargetAdvice {
            before,
            after,
            target,
        } = spec;

        let wrapped: Target<T> = Arc::new(move |resource, args, kwargs| {
            for advice in &before {
                advice
                    .call(resource, args, kwargs)
                    .map_err(|e| e.to_string())?;
            }

            let result = target(resource, args, kwargs);

            for (advice, on_failure) in &after {
                if result.is_err() && *on_failure != AfterOnFailure::Always {
                    continue;
                }
                advice
                    .call(resource, args, kwargs)
                    .map_err(|e| e.to_string())?;
            }

            result
        });

        self.composed.insert(name, Arc::clone(&wrapped));
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn before_then_target_then_after_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::<&'static str>::new()));
        let mut reg: Registry<Counter> = Registry::new();

        let o1 = Arc::clone(&order);
        reg.before(
            "run",
            Advice::Bare(Arc::new(move |_| {
                o1.lock().unwrap().push("before");
                Ok(())
            })),
        );

        let o2 = Arc::clone(&order);
        reg.set_target(
            "run",
            Arc::new(move |c, _, _| {
                o2.lock().unwrap().push("target");
                c.value += 1;
                Ok(Value::from(c.value))
            }),
        );

        let o3 = Arc::clone(&order);
        reg.after(
            "run",
            Advice::Bare(Arc::new(move |_| {
                o3.lock().unwrap().push("after");
                Ok(())
            })),
            AfterOnFailure::OnSuccessOnly,
        );

        let wrapped = reg.finalize("run");
        let mut resource = Counter::default();
        let result = wrapped(&mut resource, &[], &Map::new()).unwrap();

        assert_eq!(result, Value::from(1));
        assert_eq!(*order.lock().unwrap(), vec!["before", "target", "after"]);
    }

    #[test]
    fn advice_error_aborts_chain_and_propagates() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut reg: Registry<Counter> = Registry::new();

        reg.before(
            "run",
            Advice::Bare(Arc::new(|_| Err(AdviceError("nope".into())))),
        );
        let calls2 = Arc::clone(&calls);
        reg.before(
            "run",
            Advice::Bare(Arc::new(move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        );
        reg.set_target("run", Arc::new(|_, _, _| Ok(Value::Null)));

        let wrapped = reg.finalize("run");
        let mut resource = Counter::default();
        let result = wrapped(&mut resource, &[], &Map::new());

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0, "second before-advice must not run");
    }

    #[test]
    fn after_even_on_failure_runs_when_target_errors() {
        let ran = Arc::new(AtomicU32::new(0));
        let mut reg: Registry<Counter> = Registry::new();
        reg.set_target("run", Arc::new(|_, _, _| Err("boom".to_string())));

        let ran2 = Arc::clone(&ran);
        reg.after(
            "run",
            Advice::Bare(Arc::new(move |_| {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            AfterOnFailure::Always,
        );

        let wrapped = reg.finalize("run");
        let mut resource = Counter::default();
        let _ = wrapped(&mut resource, &[], &Map::new());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn after_default_skips_on_failure() {
        let ran = Arc::new(AtomicU32::new(0));
        let mut reg: Registry<Counter> = Registry::new();
        reg.set_target("run", Arc::new(|_, _, _| Err("boom".to_string())));

        let ran2 = Arc::clone(&ran);
        reg.after(
            "run",
            Advice::Bare(Arc::new(move |_| {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
            AfterOnFailure::OnSuccessOnly,
        );

        let wrapped = reg.finalize("run");
        let mut resource = Counter::default();
        let _ = wrapped(&mut resource, &[], &Map::new());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut reg: Registry<Counter> = Registry::new();
        reg.set_target("run", Arc::new(|_, _, _| Ok(Value::from(1))));
        let first = reg.finalize("run");
        let second = reg.finalize("run");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_target_installs_noop_placeholder() {
        let mut reg: Registry<Counter> = Registry::new();
        let wrapped = reg.finalize("never_registered");
        let mut resource = Counter::default();
        let result = wrapped(&mut resource, &[], &Map::new()).unwrap();
        assert_eq!(result, Value::Null);
    }
}
