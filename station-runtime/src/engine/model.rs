//! Per-iteration records: one tree keyed by DUT and config revision (§4.5).

use chrono::{DateTime, Local};
use serde::Serialize;

/// (sn, mn, option) identifying the unit under test for one iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DutIdentity {
    pub sn: u64,
    pub mn: u32,
    pub option: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionClassification {
    Unconnected,
    Connected,
    ShortCircuit,
    ReversedPolarity,
    PowerSupplyError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FirmwareOutcome {
    Programmed,
    Skipped,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EepromRegisterResult {
    pub target: String,
    pub index: u16,
    pub pass: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IlluminationRow {
    pub x: f64,
    pub y: f64,
    pub fcd: f64,
    pub cct: f64,
    pub duv: f64,
    pub watts: f64,
    pub percent_drop: f64,
    pub chromaticity_pass: bool,
    pub flux_pass: bool,
    pub power_pass: bool,
    pub drop_pass: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThermalDropResult {
    pub samples_fcd: Vec<f64>,
    pub max_drop_percent: f64,
    pub pass: bool,
}

/// One step's recorded payload. `success` is set exactly once, by the
/// engine, only after the step body returns or raises (§3 invariant).
#[derive(Clone, Debug, Serialize)]
pub enum StepPayload {
    ConnectionCheck(ConnectionClassification),
    Firmware(FirmwareOutcome),
    EepromConfig {
        registers: Vec<EepromRegisterResult>,
        all_pass: bool,
    },
    UnitIdentity {
        pass: bool,
    },
    IlluminationSample(IlluminationRow),
    ThermalDrop(ThermalDropResult),
}

#[derive(Clone, Debug, Serialize)]
pub struct StepRecord {
    pub name: &'static str,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub payload: Option<StepPayload>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl StepRecord {
    pub fn pending(name: &'static str) -> Self {
        Self {
            name,
            success: None,
            error: None,
            payload: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize)]
pub enum IterationState {
    Idle,
    Configured,
    Running,
    Completed,
    Aborted,
    Fatal,
}

pub(super) fn allowed_iteration_transition(from: IterationState, to: IterationState) -> bool {
    use IterationState::*;
    matches!(
        (from, to),
        (Idle, Configured)
            | (Configured, Running)
            | (Running, Completed)
            | (Running, Aborted)
            | (Running, Fatal)
            | (Configured, Fatal)
    )
}

/// The tree-shaped record of one run against one DUT (§3 "TestIteration").
#[derive(Clone, Debug, Serialize)]
pub struct TestIteration {
    pub dut: DutIdentity,
    pub config_revision: u64,
    pub steps: Vec<StepRecord>,
    pub pass: Option<bool>,
    pub unfinished: bool,
}

impl TestIteration {
    pub fn new(dut: DutIdentity, config_revision: u64) -> Self {
        Self {
            dut,
            config_revision,
            steps: Vec::new(),
            pass: None,
            unfinished: false,
        }
    }
}
