//! The error taxonomy for the station runtime.
//!
//! Every failure mode in the system maps onto one of these types. None of
//! them is a generic catch-all: callers match on the concrete type to decide
//! whether a failure is local to one step, ends the current test iteration,
//! or takes the whole station down.

use thiserror::Error;

/// A step observed a bad result. Handled locally unless the step is
/// critical, in which case the engine escalates it to [`TestFailure`].
#[derive(Debug, Error)]
#[error("step failure: {reason}")]
pub struct StepFailure {
    pub reason: String,
}

impl StepFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// This iteration cannot continue; remaining steps are skipped and the
/// iteration is committed as aborted.
#[derive(Debug, Error)]
#[error("test failure: {reason}")]
pub struct TestFailure {
    pub reason: String,
}

impl TestFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The station is in an inconsistent state: a wedged instrument, missing
/// configuration, or a broken channel. Propagates to the supervisor.
#[derive(Debug, Error)]
#[error("station failure: {reason}")]
pub struct StationFailure {
    pub reason: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Programmer error: issuing two promises on one proxy, resolving a
/// cancelled promise, combining scheduling modifiers. Never caused by the
/// device under test.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromiseError {
    #[error("cannot issue a new promise until the current one is resolved or cancelled")]
    Outstanding,
    #[error("cannot resolve a cancelled promise")]
    Cancelled,
    #[error("promise not yet resolved")]
    NotResolved,
    #[error("resolve timed out")]
    Timeout,
    #[error("cannot combine scheduling modifiers: {0}")]
    ModifierConflict(&'static str),
    #[error("cannot iterate over a promise for a single task")]
    NotIterable,
    #[error("scheduling call requires at least one time")]
    NoTimes,
    /// Rehydrated from a task's bottled exception on `resolve()`.
    #[error("task raised: {0}")]
    Raised(String),
}

/// Proxy surface misuse: calling a method that is not in the resource's
/// exposed set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{method} is not exposed on this proxy")]
pub struct ProxyError {
    pub method: &'static str,
}

impl ProxyError {
    pub fn new(method: &'static str) -> Self {
        Self { method }
    }
}

/// Channel lifecycle conditions. At the worker these are normal
/// terminations, not defects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer sent its close sentinel; not a data value.
    #[error("sentinel received from peer")]
    SentinelReceived,
    /// The link is broken: the peer is gone, or this end already closed.
    #[error("connection closed")]
    ConnectionClosed,
    /// `get`/`get_nowait` found nothing within the timeout. Not an error to
    /// a caller that expects it (e.g. the worker's poll loop).
    #[error("no message available")]
    Empty,
}

/// Cooperative cancellation raised inside a resource method when it
/// observes the proxy's cancel flag set.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A config revision could not be parsed.
#[derive(Debug, Error)]
#[error("failed to parse station config at `{path}`")]
pub struct ConfigParseError {
    pub path: String,
    #[source]
    pub source: ConfigParseSource,
}

#[derive(Debug, Error)]
pub enum ConfigParseSource {
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A `TestModel` was requested for `(mn, option)` but no such model is
/// registered in the `ConfigStore`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no test model registered for mn={mn} option={option:?}")]
pub struct ModelNotFound {
    pub mn: u32,
    pub option: Option<String>,
}

/// A `TestIteration` could not be persisted to the backing `ConfigStore`.
#[derive(Debug, Error)]
#[error("failed to commit test iteration: {reason}")]
pub struct CommitError {
    pub reason: String,
}

impl CommitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
