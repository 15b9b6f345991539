//! Time and state-machine helpers shared across the runtime.

mod deadline_sleep;
mod fsm;
mod stopwatch;

pub use deadline_sleep::{WAKE_EPSILON, deadline_sleep};
pub use fsm::StateMachine;
pub use stopwatch::{StopwatchSnapshot, StopwatchStart, stopwatch};
