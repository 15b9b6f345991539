//! Concurrency core for a laboratory test-station runtime.
//!
//! A station tests one device under test (DUT) at a time by driving a
//! handful of physical instruments — a power supply, a light meter, a
//! firmware programmer — each owned by its own [`actor::ActorWorker`] and
//! reached only through a [`proxy::Proxy`]. The [`engine::TestEngine`] walks
//! an ordered [`engine::TestStep`] catalogue against a [`config::TestModel`]
//! resolved from a [`config::ConfigStore`], producing a
//! [`engine::TestIteration`] and narrating progress through a
//! [`view::ViewSink`].
//!
//! Module map:
//! - [`channel`] — the bidirectional, typed transport (`DuplexChannel`)
//!   underlying every proxy/worker pair, in-process or cross-process.
//! - [`actor`] — `Task`, `CancelToken`, `Actor`, and the `ActorWorker` run
//!   loop that owns a resource and services its channel.
//! - [`proxy`] — `Proxy`, `Call`, and `Promise`: the caller-facing handle to
//!   a worker's resource.
//! - [`instruments`] — the concrete instrument resources the step catalogue
//!   drives (power supply, light meter, programmer).
//! - [`config`] — `TestModel` and the `ConfigStore` contract.
//! - [`scan`] — the barcode scanner grammar.
//! - [`inbound`] — messages the UI/scan-gun side sends into the engine.
//! - [`view`] — outbound UI messages, fanned out on a broadcast channel.
//! - [`engine`] — `TestEngine`, `TestStep`, and the built-in step catalogue.
//! - [`registry`] — declarative before/after advice composition; backs
//!   `ActorWorker`'s `on_shutdown` hook.
//! - [`message`] — the generic notification/response-required message shape
//!   used by both the registry's hooks and engine-adjacent tooling.
//! - [`time`] — the guarded state-machine helper and deadline-aware sleep.
//! - [`errors`] — the full error taxonomy (`StepFailure`, `TestFailure`,
//!   `StationFailure`, and friends).

pub mod actor;
pub mod channel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod inbound;
pub mod instruments;
pub mod message;
pub mod proxy;
pub mod registry;
pub mod scan;
pub mod time;
pub mod view;
