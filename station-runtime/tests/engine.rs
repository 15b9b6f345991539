//! §8 scenario S6: a step failure is local to the iteration unless the step
//! is critical; a `TestFailure` terminates the iteration outright.

use async_trait::async_trait;
use station_runtime::config::{ConfigStore, ConnectionCheck, TestModel};
use station_runtime::engine::{
    DutIdentity, StationInstruments, StepContext, StepPayload, StepRunError, TestEngine, TestStep,
};
use station_runtime::errors::{ModelNotFound, StepFailure, TestFailure};
use station_runtime::inbound::{EngineInbound, HistoryGetAllMessage, ScanMessage};
use station_runtime::view::{ViewMessage, ViewSink};

struct AlwaysOk(&'static str);

#[async_trait]
impl TestStep for AlwaysOk {
    fn name(&self) -> &'static str {
        self.0
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, _ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        Ok(StepPayload::UnitIdentity { pass: true })
    }
}

struct NonCriticalFail;

#[async_trait]
impl TestStep for NonCriticalFail {
    fn name(&self) -> &'static str {
        "step2"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, _ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        Err(StepFailure::new("bad reading").into())
    }
}

struct AbortingStep;

#[async_trait]
impl TestStep for AbortingStep {
    fn name(&self) -> &'static str {
        "step3"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, _ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        Err(TestFailure::new("fatal reading").into())
    }
}

struct FixedStore(TestModel);

impl ConfigStore for FixedStore {
    fn model(&self, _mn: u32, _option: Option<&str>) -> Result<TestModel, ModelNotFound> {
        Ok(self.0.clone())
    }
}

fn sample_model() -> TestModel {
    TestModel {
        mn: 1,
        option: None,
        config_revision: 1,
        connection_check: ConnectionCheck::Disabled,
        parameter_sheet: vec![],
        firmware: None,
        eeprom_initial: None,
        eeprom_final: None,
        unit_identity: None,
        cooldown: std::time::Duration::from_secs(0),
    }
}

#[tokio::test]
async fn step_failure_is_local_test_failure_aborts() {
    let store = FixedStore(sample_model());
    let view = ViewSink::new(8);
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(AlwaysOk("step1")),
        Box::new(NonCriticalFail),
        Box::new(AbortingStep),
    ];
    let mut engine = TestEngine::new(&store, view, steps);
    let dut = DutIdentity {
        sn: 1,
        mn: 1,
        option: None,
    };

    let iteration = engine
        .run(dut, StationInstruments::default())
        .await
        .expect("TestFailure aborts but does not propagate as a station failure");

    assert_eq!(iteration.steps.len(), 3);
    assert_eq!(iteration.steps[0].success, Some(true));
    assert_eq!(iteration.steps[1].success, Some(false));
    assert!(iteration.steps[1].error.is_some());
    assert_eq!(iteration.steps[2].success, Some(false));
    assert_eq!(iteration.pass, Some(false));
    assert!(!iteration.unfinished);
}

#[tokio::test]
async fn missing_test_model_is_a_station_failure() {
    struct EmptyStore;
    impl ConfigStore for EmptyStore {
        fn model(&self, mn: u32, option: Option<&str>) -> Result<TestModel, ModelNotFound> {
            Err(ModelNotFound {
                mn,
                option: option.map(str::to_string),
            })
        }
    }

    let store = EmptyStore;
    let view = ViewSink::new(8);
    let mut engine = TestEngine::new(&store, view, vec![]);
    let dut = DutIdentity {
        sn: 1,
        mn: 99,
        option: None,
    };

    let (iteration, failure) = engine
        .run(dut, StationInstruments::default())
        .await
        .unwrap_err();
    assert!(iteration.unfinished);
    assert!(failure.reason.contains("99"));
}

#[tokio::test]
async fn scan_inbound_narrates_a_notification() {
    let store = FixedStore(sample_model());
    let view = ViewSink::new(8);
    let mut rx = view.subscribe();
    let mut engine = TestEngine::new(&store, view, vec![]);

    engine
        .handle_inbound(
            EngineInbound::Scan(ScanMessage {
                raw: "[DUT#|12345:87654321]".to_string(),
            }),
            &mut StationInstruments::default(),
        )
        .await;

    match rx.try_recv().unwrap() {
        ViewMessage::Notification(n) => {
            assert_eq!(n.major, "scan");
            assert!(n.minor.contains("12345"));
            assert!(n.minor.contains("87654321"));
            assert_eq!(n.color, None);
        }
        other => panic!("expected a Notification, got {other:?}"),
    }
}

#[tokio::test]
async fn unrecognized_scan_is_flagged_red() {
    let store = FixedStore(sample_model());
    let view = ViewSink::new(8);
    let mut rx = view.subscribe();
    let mut engine = TestEngine::new(&store, view, vec![]);

    engine
        .handle_inbound(
            EngineInbound::Scan(ScanMessage {
                raw: "garbage".to_string(),
            }),
            &mut StationInstruments::default(),
        )
        .await;

    match rx.try_recv().unwrap() {
        ViewMessage::Notification(n) => assert_eq!(n.color, Some("red".to_string())),
        other => panic!("expected a Notification, got {other:?}"),
    }
}

#[tokio::test]
async fn history_get_all_replays_committed_iterations() {
    let store = FixedStore(sample_model());
    let view = ViewSink::new(32);
    let rx = view.subscribe();
    let steps: Vec<Box<dyn TestStep>> = vec![Box::new(AlwaysOk("step1"))];
    let mut engine = TestEngine::new(&store, view, steps);
    let dut = DutIdentity {
        sn: 1,
        mn: 1,
        option: None,
    };

    engine
        .run(dut, StationInstruments::default())
        .await
        .expect("all-ok catalogue completes");

    engine
        .handle_inbound(
            EngineInbound::HistoryGetAll(HistoryGetAllMessage),
            &mut StationInstruments::default(),
        )
        .await;

    let mut rx = rx;
    let replay = loop {
        match rx.try_recv().unwrap() {
            ViewMessage::HistorySetAll(m) => break m,
            _ => continue,
        }
    };

    assert_eq!(replay.records.len(), 1);
    assert!(replay.records[0].pf);
    assert_eq!(replay.records[0].mn, 1);
    assert_eq!(replay.records[0].sn, 1);
}
