//! The `TestStep` trait and the context a step body runs against (§4.5).

use super::model::StepPayload;
use crate::config::TestModel;
use crate::errors::{StationFailure, StepFailure, TestFailure};
use crate::instruments::{LightMeterProxy, PowerSupplyProxy, ProgrammerProxy};
use crate::view::ViewSink;

/// What a step may raise. The engine classifies this into the step record,
/// an aborted iteration, or a propagated `StationFailure` (§4.5, §7).
pub enum StepRunError {
    Step(StepFailure),
    Test(TestFailure),
    Station(StationFailure),
}

impl From<StepFailure> for StepRunError {
    fn from(e: StepFailure) -> Self {
        StepRunError::Step(e)
    }
}

impl From<TestFailure> for StepRunError {
    fn from(e: TestFailure) -> Self {
        StepRunError::Test(e)
    }
}

impl From<StationFailure> for StepRunError {
    fn from(e: StationFailure) -> Self {
        StepRunError::Station(e)
    }
}

/// The instruments and shared state one step body may reach. Any field left
/// `None` means the station has no such instrument wired up; a step that
/// needs it and finds `None` raises `StationFailure` (misconfiguration).
pub struct StepContext<'a> {
    pub model: &'a TestModel,
    pub view: &'a ViewSink,
    pub psu: Option<&'a mut PowerSupplyProxy>,
    pub light_meter: Option<&'a mut LightMeterProxy>,
    pub programmer: Option<&'a mut ProgrammerProxy>,
}

impl<'a> StepContext<'a> {
    pub fn require_psu(&mut self) -> Result<&mut PowerSupplyProxy, StationFailure> {
        self.psu
            .as_deref_mut()
            .ok_or_else(|| StationFailure::new("power supply not configured for this station"))
    }

    pub fn require_light_meter(&mut self) -> Result<&mut LightMeterProxy, StationFailure> {
        self.light_meter
            .as_deref_mut()
            .ok_or_else(|| StationFailure::new("light meter not configured for this station"))
    }

    pub fn require_programmer(&mut self) -> Result<&mut ProgrammerProxy, StationFailure> {
        self.programmer
            .as_deref_mut()
            .ok_or_else(|| StationFailure::new("programmer not configured for this station"))
    }
}

/// One declared test step. `critical` governs whether a `StepFailure` here
/// escalates to `TestFailure` and aborts the iteration (§4.5).
#[async_trait::async_trait]
pub trait TestStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn critical(&self) -> bool;

    /// Static configuration keys this step needs present on the `TestModel`
    /// before it may run. An absent key is a station misconfiguration, not
    /// a step failure (§4.5 3a).
    fn required_config_keys(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError>;
}
