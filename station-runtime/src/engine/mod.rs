//! The test engine (§4.5): resolves a `TestModel`, walks the declared
//! `TestStep`s against a scanned DUT, and produces a `TestIteration`.

pub mod model;
pub mod step;
pub mod steps;

pub use model::{
    ConnectionClassification, DutIdentity, EepromRegisterResult, FirmwareOutcome,
    IlluminationRow, IterationState, StepPayload, StepRecord, TestIteration, ThermalDropResult,
};
pub use step::{StepContext, StepRunError, TestStep};

use crate::config::ConfigStore;
use crate::errors::{ModelNotFound, StationFailure, StepFailure, TestFailure};
use crate::inbound::{EngineInbound, EngineMode};
use crate::instruments::{LightMeterProxy, PowerSupplyProxy, ProgrammerProxy};
use crate::scan::{self, ScanKind};
use crate::time::StateMachine;
use crate::view::{
    HistoryAddEntryMessage, HistorySetAllMessage, NotificationMessage, StepFinishMessage,
    StepProgressMessage, StepStartMessage, StepsInitMessage, ViewMessage, ViewSink,
};
use model::allowed_iteration_transition;
use tracing::{error, info, warn};

/// Bound on the in-memory history buffer `HistoryGetAllMessage` replays from.
const HISTORY_CAP: usize = 50;

/// The instruments wired into this station, if any. `TestEngine` does not
/// own them — it borrows the proxies for the duration of one `run()` call.
#[derive(Default)]
pub struct StationInstruments<'a> {
    pub psu: Option<&'a mut PowerSupplyProxy>,
    pub light_meter: Option<&'a mut LightMeterProxy>,
    pub programmer: Option<&'a mut ProgrammerProxy>,
}

/// Orchestrates one run against one DUT (§4.5). Holds a config store handle
/// and a view sink; does not outlive its spawning scope (§3 "Ownership").
pub struct TestEngine<'s> {
    store: &'s dyn ConfigStore,
    view: ViewSink,
    steps: Vec<Box<dyn TestStep>>,
    mode: EngineMode,
    history: Vec<HistoryAddEntryMessage>,
}

impl<'s> TestEngine<'s> {
    pub fn new(store: &'s dyn ConfigStore, view: ViewSink, steps: Vec<Box<dyn TestStep>>) -> Self {
        Self {
            store,
            view,
            steps,
            mode: EngineMode::default(),
            history: Vec::new(),
        }
    }

    /// Handles one inbound message from the UI/scan-gun side (§6 "Engine
    /// inbound messages"), narrating the result back out as a `ViewMessage`.
    pub async fn handle_inbound(
        &mut self,
        msg: EngineInbound,
        instruments: &mut StationInstruments<'_>,
    ) {
        match msg {
            EngineInbound::Scan(scan) => self.handle_scan(&scan.raw),
            EngineInbound::ModeChange(change) => self.handle_mode_change(change.mode),
            EngineInbound::TeCheck(_) => self.handle_te_check(instruments).await,
            EngineInbound::HistoryGetAll(_) => self.handle_history_get_all(),
        }
    }

    fn handle_scan(&mut self, raw: &str) {
        let (minor, color) = match scan::classify(raw) {
            ScanKind::Dut(id) => (format!("dut mn={} sn={}", id.mn, id.sn), None),
            ScanKind::DutWithOption { id, option } => {
                (format!("dut mn={} sn={} option={option}", id.mn, id.sn), None)
            }
            ScanKind::Psu { word, code } => (format!("psu {word} {code}"), None),
            ScanKind::Unrecognized(raw) => {
                (format!("unrecognized label: {raw}"), Some("red".to_string()))
            }
        };
        self.view.emit(ViewMessage::Notification(NotificationMessage {
            major: "scan".to_string(),
            minor,
            color,
        }));
    }

    fn handle_mode_change(&mut self, mode: EngineMode) {
        self.mode = mode;
        self.view.emit(ViewMessage::Notification(NotificationMessage {
            major: "mode".to_string(),
            minor: format!("{mode:?}"),
            color: None,
        }));
    }

    async fn handle_te_check(&mut self, instruments: &mut StationInstruments<'_>) {
        let mut results = Vec::new();
        if let Some(psu) = instruments.psu.as_deref_mut() {
            results.push(("psu", psu.measure().now().await.is_ok()));
        }
        if let Some(light_meter) = instruments.light_meter.as_deref_mut() {
            results.push(("light_meter", light_meter.sample().now().await.is_ok()));
        }
        if let Some(programmer) = instruments.programmer.as_deref_mut() {
            // Reachability check only: the returned match/mismatch verdict
            // isn't meaningful without a real expected version.
            results.push((
                "programmer",
                programmer.confirm(String::new()).now().await.is_ok(),
            ));
        }

        let all_pass = results.iter().all(|(_, ok)| *ok);
        let minor = results
            .iter()
            .map(|(name, ok)| format!("{name}={ok}"))
            .collect::<Vec<_>>()
            .join(",");
        self.view.emit(ViewMessage::Notification(NotificationMessage {
            major: "te_check".to_string(),
            minor,
            color: if all_pass { None } else { Some("red".to_string()) },
        }));
    }

    fn handle_history_get_all(&self) {
        self.view.emit(ViewMessage::HistorySetAll(HistorySetAllMessage {
            records: self.history.clone(),
        }));
    }

    /// The default step catalogue per the §4.5 table.
    pub fn default_steps() -> Vec<Box<dyn TestStep>> {
        vec![
            Box::new(steps::ConnectionCheckStep),
            Box::new(steps::FirmwareStep),
            Box::new(steps::EepromConfigStep {
                which: steps::EepromWhich::Initial,
            }),
            Box::new(steps::UnitIdentityStep),
            Box::new(steps::IlluminationSampleStep),
            Box::new(steps::EepromConfigStep {
                which: steps::EepromWhich::Final,
            }),
        ]
    }

    /// Runs the full step catalogue against `dut`, per the §4.5 contract.
    /// Returns the completed iteration on success; `StationFailure` only
    /// when the engine itself cannot continue (iteration still returned,
    /// tagged unfinished, for the caller to persist).
    pub async fn run(
        &mut self,
        dut: DutIdentity,
        mut instruments: StationInstruments<'_>,
    ) -> Result<TestIteration, (TestIteration, StationFailure)> {
        let mut fsm = StateMachine::new(IterationState::Idle, allowed_iteration_transition);

        let model = match self.store.model(dut.mn, dut.option.as_deref()) {
            Ok(model) => model,
            Err(ModelNotFound { mn, option }) => {
                let mut iteration = TestIteration::new(dut, 0);
                iteration.unfinished = true;
                let failure = StationFailure::new(format!(
                    "no test model registered for mn={mn} option={option:?}"
                ));
                self.commit(&iteration);
                return Err((iteration, failure));
            }
        };

        fsm.force_transition(IterationState::Configured);
        let mut iteration = TestIteration::new(dut, model.config_revision);

        self.view.emit(ViewMessage::StepsInit(StepsInitMessage {
            steps: self.steps.iter().map(|s| s.name().to_string()).collect(),
        }));

        fsm.force_transition(IterationState::Running);

        let step_count = self.steps.len();
        for step in self.steps.iter_mut() {
            let mut record = StepRecord::pending(step.name());
            record.started_at = Some(chrono::Local::now());
            self.view.emit(ViewMessage::StepStart(StepStartMessage {
                step: step.name().to_string(),
            }));

            for key in step.required_config_keys() {
                if !model_has_key(&model, key) {
                    record.finished_at = Some(chrono::Local::now());
                    record.success = Some(false);
                    record.error = Some(format!("missing required config key: {key}"));
                    iteration.steps.push(record);
                    iteration.unfinished = true;
                    let failure =
                        StationFailure::new(format!("station misconfigured: missing key {key}"));
                    error!(step = step.name(), "missing required config key");
                    self.commit(&iteration);
                    return Err((iteration, failure));
                }
            }

            let mut ctx = StepContext {
                model: &model,
                view: &self.view,
                psu: instruments.psu.as_deref_mut(),
                light_meter: instruments.light_meter.as_deref_mut(),
                programmer: instruments.programmer.as_deref_mut(),
            };

            let outcome = step.run(&mut ctx).await;
            record.finished_at = Some(chrono::Local::now());

            match outcome {
                Ok(payload) => {
                    record.success = Some(true);
                    record.payload = Some(payload);
                    self.view.emit(ViewMessage::StepFinish(StepFinishMessage {
                        step: step.name().to_string(),
                        success: Some(true),
                    }));
                    iteration.steps.push(record);
                }
                Err(StepRunError::Step(StepFailure { reason })) => {
                    record.success = Some(false);
                    record.error = Some(reason.clone());
                    self.view.emit(ViewMessage::StepFinish(StepFinishMessage {
                        step: step.name().to_string(),
                        success: Some(false),
                    }));
                    let critical = step.critical();
                    let step_name = step.name();
                    iteration.steps.push(record);

                    if critical {
                        warn!(step = step_name, "critical step failed, aborting iteration");
                        fsm.force_transition(IterationState::Aborted);
                        iteration.pass = Some(false);
                        self.commit(&iteration);
                        return Ok(iteration);
                    }
                }
                Err(StepRunError::Test(TestFailure { reason })) => {
                    record.success = Some(false);
                    record.error = Some(reason);
                    iteration.steps.push(record);
                    fsm.force_transition(IterationState::Aborted);
                    iteration.pass = Some(false);
                    self.commit(&iteration);
                    return Ok(iteration);
                }
                Err(StepRunError::Station(failure)) => {
                    record.success = Some(false);
                    record.error = Some(failure.reason.clone());
                    iteration.steps.push(record);
                    iteration.unfinished = true;
                    fsm.force_transition(IterationState::Fatal);
                    self.commit(&iteration);
                    return Err((iteration, failure));
                }
            }

            self.view.emit(ViewMessage::StepProgress(StepProgressMessage {
                step: iteration.steps.last().map(|r| r.name.to_string()).unwrap_or_default(),
                value: iteration.steps.len() as f64 / step_count as f64,
            }));
        }

        fsm.force_transition(IterationState::Completed);
        // Every critical step that ran must have succeeded, or we would have
        // aborted above; this is exactly the "AND of critical steps" rule.
        iteration.pass = Some(true);
        info!(dut_sn = iteration.dut.sn, "iteration complete");
        self.commit(&iteration);
        Ok(iteration)
    }

    /// Persists `iteration` via the store's `commit_iteration` and, if it
    /// reached a verdict, appends it to the in-memory history buffer
    /// `HistoryGetAllMessage` replays from. A commit failure is logged, not
    /// escalated — losing the durable record doesn't change the outcome the
    /// caller already observed.
    fn commit(&mut self, iteration: &TestIteration) {
        if let Err(e) = self.store.commit_iteration(iteration) {
            error!(error = %e, "failed to commit test iteration");
        }

        let Some(pass) = iteration.pass else { return };
        let entry = HistoryAddEntryMessage {
            id: self.history.len() as u64 + 1,
            pf: pass,
            dt: chrono::Local::now(),
            mn: iteration.dut.mn,
            sn: iteration.dut.sn,
        };
        self.view.emit(ViewMessage::HistoryAddEntry(entry.clone()));
        self.history.push(entry);
        if self.history.len() > HISTORY_CAP {
            self.history.remove(0);
        }
    }
}

fn model_has_key(model: &crate::config::TestModel, key: &str) -> bool {
    match key {
        "connection_check" => true,
        "parameter_sheet" => !model.parameter_sheet.is_empty(),
        "firmware" => model.firmware.is_some(),
        "eeprom_initial" => model.eeprom_initial.is_some(),
        "eeprom_final" => model.eeprom_final.is_some(),
        "unit_identity" => model.unit_identity.is_some(),
        _ => false,
    }
}
