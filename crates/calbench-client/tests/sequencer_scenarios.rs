//! 测试序列端到端场景（模拟万用表）

use calbench_bus::{SimMonitor, SimulatedDmm};
use calbench_client::{
    AutoConfirm, OperatorError, OperatorPrompt, RunInfo, RunReport, SequencerError,
    SequencerObserver, SequencerState, StageFailure, StageSequencer, TestKind, TestProfile,
    TestResult, TestStage, Verdict,
};
use calbench_driver::{DriverError, Instrument};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn sequencer_for(sim: SimulatedDmm, timeout: Duration) -> (StageSequencer<SimulatedDmm>, SimMonitor) {
    let monitor = sim.monitor();
    let mut instrument = Instrument::new(sim).unwrap();
    instrument.set_timeout(timeout);
    (StageSequencer::new(instrument), monitor)
}

fn single_stage_profile() -> TestProfile {
    TestProfile::from_toml_str(
        r#"
        title = "Single"
        filename_prefix = "single"

        [measurement]
        range_volts = 2.0
        sample_count = 3

        [[stages]]
        label = "Only"
        low = 0.5
        high = 0.6
        "#,
    )
    .unwrap()
}

fn count(transcript: &[String], line: &str) -> usize {
    transcript.iter().filter(|l| l.as_str() == line).count()
}

#[test]
fn zero_carryover_end_to_end() {
    let mut responses = vec!["0.001,0.002,0.0015,-0.001".to_string()];
    responses.extend((1..10).map(|_| "0.0004,-0.0002".to_string()));

    let (mut sequencer, monitor) = sequencer_for(SimulatedDmm::scripted(responses), Duration::from_secs(2));
    let profile = TestProfile::builtin(TestKind::ZeroCarryover).unwrap();
    let mut operator = AutoConfirm::new();

    let results = sequencer.run(&profile, &mut operator).unwrap();

    assert_eq!(results.len(), 10);
    let first = &results[0];
    assert_eq!(first.stage(&profile).label, "Fully CCW");
    assert_eq!(first.summary.count, 4);
    assert_eq!(first.summary.min, -0.001);
    assert_eq!(first.summary.max, 0.002);
    assert!((first.summary.mean - 0.000875).abs() < 1e-12);
    assert_eq!(first.limit.low(), -0.015);
    assert_eq!(first.limit.high(), 0.015);
    assert_eq!(first.verdict, Verdict::Pass);
    assert!(results.iter().all(|r| r.verdict == Verdict::Pass));

    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.stage_index, i);
    }

    assert_eq!(sequencer.state(), SequencerState::Complete);
    assert_eq!(operator.confirmed().len(), 10);
    assert_eq!(operator.confirmed()[9], "Fully CW");
    assert_eq!(monitor.triggers(), 10);
    assert_eq!(monitor.discards(), 10);
    assert_eq!(monitor.local_returns(), 1);

    let report = RunReport::build(&profile, &results, RunInfo::default());
    assert!(report.passed());
    assert_eq!(report.rows[0].label, "Fully CCW");
}

#[test]
fn configuration_happens_once_and_arm_precedes_every_fetch() {
    let responses: Vec<String> = (0..10).map(|_| "1.0".to_string()).collect();
    let (mut sequencer, monitor) = sequencer_for(SimulatedDmm::scripted(responses), Duration::from_secs(2));
    let profile = TestProfile::instrument_accuracy();

    sequencer.run(&profile, &mut AutoConfirm::new()).unwrap();

    let transcript = monitor.transcript();
    assert_eq!(count(&transcript, ":SENSe:FUNCtion 'VOLTage:DC'"), 1);
    assert_eq!(count(&transcript, "*SRE 1"), 1);
    assert_eq!(count(&transcript, "*OPC?"), 1);
    assert_eq!(count(&transcript, ":SENSe:VOLTage:DC:RANGe 2"), 1);

    // 同步查询在第一次触发之前
    let sync = transcript.iter().position(|l| l == "*OPC?").unwrap();
    let first_trigger = transcript.iter().position(|l| l == "<GET>").unwrap();
    assert!(sync < first_trigger);

    // 每次取数之前都有一次（且仅一次）布防 + 触发
    let mut armed = false;
    let mut fetches = 0;
    for line in &transcript {
        match line.as_str() {
            ":INITiate" => {
                assert!(!armed, "initiated twice without fetching");
                armed = true;
            },
            ":TRACe:DATA?" => {
                assert!(armed, "fetch without arm");
                armed = false;
                fetches += 1;
            },
            _ => {},
        }
    }
    assert_eq!(fetches, 10);

    // 最后释放：中止、复位、返回本地
    assert_eq!(
        &transcript[transcript.len() - 3..],
        [":ABORt", "*RST", "<GTL>"]
    );
}

#[test]
fn malformed_field_is_dropped() {
    let (mut sequencer, _monitor) = sequencer_for(SimulatedDmm::scripted(["0.5,abc,0.6"]), Duration::from_secs(2));
    let results = sequencer.run(&single_stage_profile(), &mut AutoConfirm::new()).unwrap();

    let summary = results[0].summary;
    assert_eq!(summary.count, 2);
    assert!((summary.mean - 0.55).abs() < 1e-12);
    assert_eq!(results[0].verdict, Verdict::Pass);
}

#[test]
fn empty_burst_fails_the_stage() {
    let (mut sequencer, monitor) = sequencer_for(SimulatedDmm::scripted(["abc,def"]), Duration::from_secs(2));
    let err = sequencer.run(&single_stage_profile(), &mut AutoConfirm::new()).unwrap_err();

    match err {
        SequencerError::Stage {
            index,
            ref label,
            operation,
            source: StageFailure::EmptyBurst { rejected },
        } => {
            assert_eq!(index, 0);
            assert_eq!(label, "Only");
            assert_eq!(operation, SequencerState::Reducing);
            assert_eq!(rejected, 2);
        },
        other => panic!("unexpected error: {other}"),
    }

    // 出错后仍然释放仪器
    assert_eq!(monitor.local_returns(), 1);
}

#[test]
fn missing_completion_names_stage_and_operation() {
    let sim = SimulatedDmm::scripted(["0.0"]).suppress_srq();
    let (mut sequencer, monitor) = sequencer_for(sim, Duration::from_millis(150));
    let profile = TestProfile::zero_carryover();

    let err = sequencer.run(&profile, &mut AutoConfirm::new()).unwrap_err();

    match &err {
        SequencerError::Stage {
            index,
            label,
            operation,
            source: StageFailure::Driver(DriverError::CompletionTimeout { timeout }),
        } => {
            assert_eq!(*index, 0);
            assert_eq!(label, "Fully CCW");
            assert_eq!(*operation, SequencerState::AwaitingCompletion);
            assert_eq!(*timeout, Duration::from_millis(150));
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("awaiting completion"));
    assert_eq!(sequencer.state(), SequencerState::AwaitingCompletion);
    assert_eq!(monitor.triggers(), 1);
    assert_eq!(monitor.local_returns(), 1);
}

#[test]
fn configure_failure_is_reported() {
    let sim = SimulatedDmm::scripted(Vec::<String>::new()).fail_on("*OPC?");
    let (mut sequencer, monitor) = sequencer_for(sim, Duration::from_secs(1));

    let err = sequencer.run(&TestProfile::zero_carryover(), &mut AutoConfirm::new()).unwrap_err();
    assert!(matches!(err, SequencerError::Configure { .. }));
    assert_eq!(monitor.triggers(), 0);
    assert_eq!(monitor.local_returns(), 1);
}

#[test]
fn release_failure_keeps_completed_results() {
    let sim = SimulatedDmm::scripted(["0.55"]).fail_on(":ABORt");
    let (mut sequencer, monitor) = sequencer_for(sim, Duration::from_secs(2));

    let results = sequencer.run(&single_stage_profile(), &mut AutoConfirm::new()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].verdict, Verdict::Pass);
    assert_eq!(sequencer.state(), SequencerState::Complete);
    assert_eq!(monitor.local_returns(), 0);
}

#[test]
fn sync_mismatch_is_advisory() {
    let sim = SimulatedDmm::scripted(["0.55"]).with_opc_reply("0");
    let (mut sequencer, _monitor) = sequencer_for(sim, Duration::from_secs(2));
    let results = sequencer.run(&single_stage_profile(), &mut AutoConfirm::new()).unwrap();
    assert_eq!(results.len(), 1);
}

/// 在指定阶段中止的操作员
struct AbortAt(&'static str);

impl OperatorPrompt for AbortAt {
    fn select(&mut self, _title: &str, _choices: &[String]) -> Result<usize, OperatorError> {
        Ok(0)
    }

    fn pause_for_confirmation(&mut self, label: &str) -> Result<(), OperatorError> {
        if label == self.0 { Err(OperatorError::Aborted) } else { Ok(()) }
    }
}

#[test]
fn operator_abort_stops_the_run() {
    let responses: Vec<String> = (0..10).map(|_| "0.0".to_string()).collect();
    let (mut sequencer, monitor) = sequencer_for(SimulatedDmm::scripted(responses), Duration::from_secs(2));

    let err = sequencer.run(&TestProfile::zero_carryover(), &mut AbortAt("2 Steps CW")).unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(err.stage_index(), Some(2));
    assert_eq!(monitor.triggers(), 2);
    assert_eq!(monitor.local_returns(), 1);
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<(SequencerState, Option<usize>)>>,
    results: Mutex<Vec<(String, Verdict)>>,
}

impl SequencerObserver for Recorder {
    fn on_state(&self, state: SequencerState, stage: Option<&TestStage>) {
        self.states.lock().unwrap().push((state, stage.map(|s| s.index)));
    }

    fn on_result(&self, stage: &TestStage, result: &TestResult) {
        self.results.lock().unwrap().push((stage.label.clone(), result.verdict));
    }
}

#[test]
fn observers_see_every_transition() {
    let (mut sequencer, _monitor) = sequencer_for(SimulatedDmm::scripted(["0.7"]), Duration::from_secs(2));
    let recorder = Arc::new(Recorder::default());
    sequencer.add_observer(recorder.clone());

    sequencer.run(&single_stage_profile(), &mut AutoConfirm::new()).unwrap();

    let states = recorder.states.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            (SequencerState::Configuring, None),
            (SequencerState::AwaitingOperator, Some(0)),
            (SequencerState::Arming, Some(0)),
            (SequencerState::AwaitingCompletion, Some(0)),
            (SequencerState::Fetching, Some(0)),
            (SequencerState::Reducing, Some(0)),
            (SequencerState::Complete, None),
        ]
    );

    // 0.7 超出 [0.5, 0.6]
    assert_eq!(
        *recorder.results.lock().unwrap(),
        vec![("Only".to_string(), Verdict::Fail)]
    );
}

#[test]
fn calibration_factor_run_with_nominal_readings() {
    let sim = SimulatedDmm::new(|label: Option<&str>, count: u32| {
        let pct: f64 = label.and_then(|l| l.parse().ok()).unwrap_or(100.0);
        let nominal = 100.0 / pct;
        vec![format!("{nominal:.6}"); count as usize].join(",")
    });
    let (mut sequencer, monitor) = sequencer_for(sim, Duration::from_secs(2));
    let profile = TestProfile::calibration_factor();

    let results = sequencer.run(&profile, &mut AutoConfirm::new()).unwrap();
    assert_eq!(results.len(), 16);
    assert!(results.iter().all(|r| r.verdict == Verdict::Pass));
    assert_eq!(results[0].summary.count, 100);
    assert_eq!(monitor.triggers(), 16);

    let report = RunReport::build(&profile, &results, RunInfo::default());
    let pairs = report.paired_rows();
    assert_eq!(pairs.len(), 8);
    assert_eq!(pairs[0].left.label, "100");
    assert_eq!(pairs[0].right.as_ref().map(|r| r.label.as_str()), Some("92"));
    assert_eq!(pairs[7].right.as_ref().map(|r| r.label.as_str()), Some("85"));
}

#[test]
fn empty_profile_is_rejected_before_touching_the_instrument() {
    let (mut sequencer, monitor) = sequencer_for(SimulatedDmm::scripted(["0"]), Duration::from_secs(1));
    let mut profile = single_stage_profile();
    profile.points.clear();

    let err = sequencer.run(&profile, &mut AutoConfirm::new()).unwrap_err();
    assert!(matches!(err, SequencerError::Profile(_)));
    // 只有打开会话时的器件清除
    assert_eq!(monitor.transcript(), vec!["<SDC>"]);
}
