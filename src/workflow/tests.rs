// Scenario tests for the states and the orchestrator

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;

use super::mocks::*;
use super::orchestrator::{is_legal, Orchestrator, StateSet};
use super::states::*;
use super::strategy::StateStrategy;
use super::types::*;
use crate::config::DataPathsConfig;
use crate::context::{ExecutionContext, LogLevel};
use crate::domain::{
    OutputFormat, PressReading, SessionParameters, SpecimenMeasurement, TestSession,
};
use crate::errors::{ErrorKind, WorkflowError};
use crate::input::Trigger;
use crate::storage::LabStorage;

fn storage(dir: &TempDir) -> LabStorage {
    LabStorage::from_config(&DataPathsConfig {
        registry_file: dir.path().join("registry.jsonl"),
        clients_file: dir.path().join("clients.json"),
        concrete_classes_file: dir.path().join("concrete_classes.json"),
    })
}

fn parameters(protocol: &str, set_size: u32) -> SessionParameters {
    let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    SessionParameters::from_raw(&submission(protocol, "SET-7", set_size), today).unwrap()
}

fn complete_session(set_size: u32) -> TestSession {
    let mut session = TestSession::new(parameters("beam_flexural_testing", set_size));
    for index in 1..=set_size {
        session
            .push_specimen(SpecimenMeasurement {
                index,
                scale: None,
                press: Some(PressReading {
                    load_n: 900_000.0,
                    strength_mpa: 40.0,
                }),
            })
            .unwrap();
    }
    session
}

fn expect_goto(transition: Transition) -> (WorkflowState, TransitionPayload) {
    match transition {
        Transition::Goto { target, payload } => (target, payload),
        Transition::Stop => panic!("expected a transition, got Stop"),
    }
}

fn expect_failure(payload: TransitionPayload) -> ErrorEnvelope {
    match payload {
        TransitionPayload::Failure(envelope) => *envelope,
        other => panic!("expected a failure payload, got {}", other.kind_name()),
    }
}

/// Execute one state and check its chosen edge against the table
async fn step(
    state: &mut dyn StateStrategy,
    ctx: &ExecutionContext,
) -> (WorkflowState, TransitionPayload) {
    let (target, payload) = expect_goto(state.execute(ctx).await.unwrap());
    assert!(
        is_legal(state.state(), target),
        "{} chose illegal target {}",
        state.state(),
        target
    );
    assert!(state.can_transition_to(ctx, target));
    (target, payload)
}

#[tokio::test]
async fn test_idle_start_without_data_goes_to_collect_input() {
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new()
        .with_trigger(Trigger::Wait)
        .with_trigger(Trigger::Start(None));
    let mut idle = IdleState::new(shared_input(&ctx, &input));

    idle.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut idle, &ctx).await;

    assert_eq!(target, WorkflowState::CollectInput);
    assert!(matches!(payload, TransitionPayload::Empty));
}

#[tokio::test]
async fn test_idle_forwards_pushed_submission() {
    let ctx = test_context(RecordingSink::new());
    let raw = submission("cube_compression_testing", "A-1", 3);
    let input = ScriptedInput::new().with_trigger(Trigger::Start(Some(raw.clone())));
    let mut idle = IdleState::new(shared_input(&ctx, &input));

    idle.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut idle, &ctx).await;

    assert_eq!(target, WorkflowState::CollectInput);
    match payload {
        TransitionPayload::Submission(forwarded) => assert_eq!(forwarded, raw),
        other => panic!("unexpected payload {}", other.kind_name()),
    }
}

#[tokio::test]
async fn test_idle_exit_request_stops() {
    let ctx = test_context(RecordingSink::new());
    let mut idle = IdleState::new(shared_input(&ctx, &ScriptedInput::new()));

    idle.enter(&ctx, TransitionPayload::Empty).unwrap();
    assert!(matches!(idle.execute(&ctx).await.unwrap(), Transition::Stop));
}

#[tokio::test]
async fn test_idle_stops_on_shutdown() {
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new().with_trigger(Trigger::Start(None));
    let mut idle = IdleState::new(shared_input(&ctx, &input));

    idle.enter(&ctx, TransitionPayload::Empty).unwrap();
    ctx.shutdown.trigger();
    assert!(matches!(idle.execute(&ctx).await.unwrap(), Transition::Stop));
}

#[tokio::test]
async fn test_idle_rejects_session_payload() {
    let ctx = test_context(RecordingSink::new());
    let mut idle = IdleState::new(shared_input(&ctx, &ScriptedInput::new()));

    let err = idle
        .enter(&ctx, TransitionPayload::Session(complete_session(1)))
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidEntryPayload {
            state: WorkflowState::Idle,
            received: "session",
            ..
        }
    ));
}

#[tokio::test]
async fn test_collect_input_missing_field_retries() {
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let mut raw = submission("cube_compression_testing", "A-1", 3);
    raw.remove("client");
    let input = ScriptedInput::new().with_submission(raw);
    let mut collect = CollectInputState::new(shared_input(&ctx, &input));

    collect.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut collect, &ctx).await;

    assert_eq!(target, WorkflowState::CollectInput);
    match payload {
        TransitionPayload::RetryInput { error } => {
            assert_eq!(error, "Missing required fields: client");
            collect
                .enter(&ctx, TransitionPayload::RetryInput { error })
                .unwrap();
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
    assert!(sink.contains("Retrying input collection after error"));
}

#[tokio::test]
async fn test_collect_input_uses_pushed_submission() {
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new();
    let mut collect = CollectInputState::new(shared_input(&ctx, &input));

    let raw = submission("cube_frost_testing", "F-2", 2);
    collect
        .enter(&ctx, TransitionPayload::Submission(raw))
        .unwrap();
    let (target, payload) = step(&mut collect, &ctx).await;

    assert_eq!(target, WorkflowState::Acquire);
    match payload {
        TransitionPayload::Parameters(p) => {
            assert_eq!(p.set_id, "F-2");
            assert_eq!(p.set_size, 2);
            assert_eq!(p.output_formats, vec![OutputFormat::Pdf, OutputFormat::Excel]);
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
}

#[tokio::test]
async fn test_collect_input_protocol_ceiling_retries() {
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new().with_submission(submission("beam_compression_testing", "B-1", 11));
    let mut collect = CollectInputState::new(shared_input(&ctx, &input));

    collect.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut collect, &ctx).await;

    assert_eq!(target, WorkflowState::CollectInput);
    assert!(matches!(payload, TransitionPayload::RetryInput { .. }));
}

#[tokio::test]
async fn test_collect_input_cancel_returns_to_idle() {
    let ctx = test_context(RecordingSink::new());
    let mut collect = CollectInputState::new(shared_input(&ctx, &ScriptedInput::new()));

    collect.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut collect, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(payload, TransitionPayload::Notice(IdleNotice::Cancelled)));
}

#[tokio::test]
async fn test_collect_input_device_failure_is_recoverable() {
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new()
        .with_collect_failure(WorkflowError::Device("terminal disconnected".into()));
    let mut collect = CollectInputState::new(shared_input(&ctx, &input));

    collect.enter(&ctx, TransitionPayload::Empty).unwrap();
    let (target, payload) = step(&mut collect, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    let envelope = expect_failure(payload);
    assert!(envelope.recoverable);
    assert_eq!(envelope.source_state, WorkflowState::CollectInput);
}

#[tokio::test]
async fn test_acquire_measures_full_set() {
    let ctx = test_context(RecordingSink::new());
    let source = Arc::new(ScriptedInstruments::with_strengths(vec![35.0, 41.5]));
    let mut acquire = AcquireState::new(source.clone());

    acquire
        .enter(&ctx, TransitionPayload::Parameters(parameters("cube_compression_testing", 2)))
        .unwrap();
    let (target, payload) = step(&mut acquire, &ctx).await;

    assert_eq!(target, WorkflowState::Disseminate);
    match payload {
        TransitionPayload::Session(session) => {
            assert!(session.is_complete());
            assert_eq!(session.specimens().len(), 2);
            assert_eq!(session.specimens()[1].press.map(|p| p.strength_mpa), Some(41.5));
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
    assert_eq!(source.scale_reads(), 2);
    assert_eq!(source.press_reads(), 2);
}

#[tokio::test]
async fn test_acquire_device_failure_keeps_partial_session() {
    let ctx = test_context(RecordingSink::new());
    let source = Arc::new(ScriptedInstruments::failing_on_press(2));
    let mut acquire = AcquireState::new(source);

    acquire
        .enter(&ctx, TransitionPayload::Parameters(parameters("beam_flexural_testing", 3)))
        .unwrap();
    let (target, payload) = step(&mut acquire, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    let envelope = expect_failure(payload);
    assert_eq!(envelope.error.kind(), ErrorKind::Device);
    assert_eq!(envelope.source_state, WorkflowState::Acquire);
    assert!(envelope.recoverable);
    let partial = envelope.partial_data.expect("partial session");
    assert_eq!(partial.specimens().len(), 1);
    assert_eq!(partial.next_index(), 2);
}

#[tokio::test]
async fn test_acquire_non_device_failure_is_not_recoverable() {
    let ctx = test_context(RecordingSink::new());
    let source = Arc::new(ScriptedInstruments::failing_on_press_with(
        2,
        WorkflowError::Configuration("press calibration table missing".into()),
    ));
    let mut acquire = AcquireState::new(source);

    acquire
        .enter(&ctx, TransitionPayload::Parameters(parameters("beam_flexural_testing", 3)))
        .unwrap();
    let (target, payload) = step(&mut acquire, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    let envelope = expect_failure(payload);
    assert_eq!(envelope.error.kind(), ErrorKind::Configuration);
    assert!(!envelope.recoverable);
    let partial = envelope.partial_data.expect("partial session");
    assert_eq!(partial.specimens().len(), 1);
}

#[tokio::test]
async fn test_acquire_rejects_set_beyond_protocol_ceiling() {
    let ctx = test_context(RecordingSink::new());
    let source = Arc::new(ScriptedInstruments::new());
    let mut acquire = AcquireState::new(source.clone());

    let mut oversized = parameters("beam_compression_testing", 10);
    oversized.set_size = 11;
    acquire
        .enter(&ctx, TransitionPayload::Parameters(oversized))
        .unwrap();
    let (target, payload) = step(&mut acquire, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    let envelope = expect_failure(payload);
    assert_eq!(envelope.error.kind(), ErrorKind::Protocol);
    assert!(!envelope.recoverable);
    assert_eq!(source.press_reads(), 0);
}

#[tokio::test]
async fn test_acquire_shutdown_returns_to_idle() {
    let ctx = test_context(RecordingSink::new());
    let source = Arc::new(ScriptedInstruments::new());
    let mut acquire = AcquireState::new(source.clone());

    acquire
        .enter(&ctx, TransitionPayload::Parameters(parameters("cube_compression_testing", 3)))
        .unwrap();
    ctx.shutdown.trigger();
    let (target, payload) = step(&mut acquire, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(payload, TransitionPayload::Notice(IdleNotice::Cancelled)));
    assert_eq!(source.scale_reads(), 0);
    assert_eq!(source.press_reads(), 0);
}

#[tokio::test]
async fn test_device_recovery_resumes_acquisition() {
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let source = Arc::new(ScriptedInstruments::failing_on_press(2));
    let reconnector = Arc::new(ScriptedReconnector::succeeding());
    let mut acquire = AcquireState::new(source.clone());
    let mut error = ErrorState::new(reconnector.clone());

    acquire
        .enter(&ctx, TransitionPayload::Parameters(parameters("beam_flexural_testing", 3)))
        .unwrap();
    let (_, payload) = step(&mut acquire, &ctx).await;
    acquire.exit(&ctx);

    error.enter(&ctx, payload).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;
    error.exit(&ctx);
    assert_eq!(target, WorkflowState::Acquire);
    assert_eq!(reconnector.calls(), 1);
    assert!(sink.contains("Presa a fost reconectată"));

    acquire.enter(&ctx, payload).unwrap();
    let (target, payload) = step(&mut acquire, &ctx).await;
    assert_eq!(target, WorkflowState::Disseminate);
    match payload {
        TransitionPayload::Session(session) => {
            let indices: Vec<u32> = session.specimens().iter().map(|s| s.index).collect();
            assert_eq!(indices, vec![1, 2, 3]);
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
    assert_eq!(source.press_reads(), 4);
}

#[tokio::test]
async fn test_refused_reconnection_saves_partial_data() {
    let ctx = test_context(RecordingSink::new());
    let mut error = ErrorState::new(Arc::new(ScriptedReconnector::refusing()));

    let mut partial = TestSession::new(parameters("beam_flexural_testing", 3));
    partial
        .push_specimen(complete_session(1).specimens()[0].clone())
        .unwrap();
    let envelope = ErrorEnvelope::new(
        WorkflowError::Device("press not responding".into()),
        WorkflowState::Acquire,
        true,
    )
    .with_partial_data(partial);

    error.enter(&ctx, TransitionPayload::failure(envelope)).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(
        payload,
        TransitionPayload::Notice(IdleNotice::PartialDataSaved { specimens: 1 })
    ));
}

#[tokio::test]
async fn test_failing_recovery_falls_back_to_idle() {
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let mut error = ErrorState::new(Arc::new(ScriptedReconnector::failing()));

    let envelope = ErrorEnvelope::new(
        WorkflowError::Device("scale timeout".into()),
        WorkflowState::CollectInput,
        true,
    );
    error.enter(&ctx, TransitionPayload::failure(envelope)).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(payload, TransitionPayload::Notice(IdleNotice::CriticalFallback)));
    assert_eq!(sink.count_at(LogLevel::Critical), 1);
}

#[tokio::test]
async fn test_automatic_recovery_is_bounded_per_failure_point() {
    let ctx = test_context(RecordingSink::new());
    let reconnector = Arc::new(ScriptedReconnector::succeeding());
    let mut error = ErrorState::new(reconnector.clone());
    let failure = || {
        TransitionPayload::failure(ErrorEnvelope::new(
            WorkflowError::Device("terminal disconnected".into()),
            WorkflowState::CollectInput,
            true,
        ))
    };

    for _ in 0..MAX_AUTOMATIC_RECOVERIES {
        error.enter(&ctx, failure()).unwrap();
        let (target, payload) = step(&mut error, &ctx).await;
        assert_eq!(target, WorkflowState::CollectInput);
        assert!(matches!(payload, TransitionPayload::Empty));
        error.exit(&ctx);
    }

    error.enter(&ctx, failure()).unwrap();
    let (target, _) = step(&mut error, &ctx).await;
    error.exit(&ctx);
    assert_eq!(target, WorkflowState::CollectInput);
    assert_eq!(reconnector.calls() as u32, MAX_AUTOMATIC_RECOVERIES);

    // still failing after manual recovery: give up on the cycle
    error.enter(&ctx, failure()).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;
    error.exit(&ctx);
    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(payload, TransitionPayload::Notice(IdleNotice::CriticalFallback)));

    // a new cycle starts with a fresh budget
    error.enter(&ctx, failure()).unwrap();
    let (target, _) = step(&mut error, &ctx).await;
    assert_eq!(target, WorkflowState::CollectInput);
    assert_eq!(reconnector.calls() as u32, MAX_AUTOMATIC_RECOVERIES + 1);
}

#[tokio::test]
async fn test_validation_error_from_input_retries() {
    let ctx = test_context(RecordingSink::new());
    let mut error = ErrorState::new(Arc::new(ScriptedReconnector::succeeding()));

    let envelope = ErrorEnvelope::new(
        WorkflowError::Validation("set_size must be between 1 and 100".into()),
        WorkflowState::CollectInput,
        true,
    );
    error.enter(&ctx, TransitionPayload::failure(envelope)).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;

    assert_eq!(target, WorkflowState::CollectInput);
    match payload {
        TransitionPayload::RetryInput { error } => {
            assert_eq!(error, "set_size must be between 1 and 100")
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
}

#[tokio::test]
async fn test_configuration_error_goes_to_manual_recovery() {
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let reconnector = Arc::new(ScriptedReconnector::succeeding());
    let mut error = ErrorState::new(reconnector.clone());

    let envelope = ErrorEnvelope::new(
        WorkflowError::Configuration("reports_dir is not writable".into()),
        WorkflowState::Disseminate,
        true,
    );
    error.enter(&ctx, TransitionPayload::failure(envelope)).unwrap();
    let (target, payload) = step(&mut error, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    assert!(matches!(payload, TransitionPayload::Notice(IdleNotice::RecoveredFromError)));
    assert_eq!(reconnector.calls(), 0);
    assert!(sink.contains("Problemă de configurare: reports_dir is not writable"));
}

#[tokio::test]
async fn test_error_rejects_non_failure_payload() {
    let ctx = test_context(RecordingSink::new());
    let mut error = ErrorState::new(Arc::new(ScriptedReconnector::succeeding()));

    let err = error.enter(&ctx, TransitionPayload::Empty).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateMachine);
}

#[tokio::test]
async fn test_disseminate_generates_each_format_and_unlocks_once() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new();
    let output = RecordingOutput::new();
    let lab = storage(&dir);
    let mut disseminate = DisseminateState::new(
        shared_input(&ctx, &input),
        shared_output(&ctx, &output),
        lab.clone(),
    );

    disseminate
        .enter(&ctx, TransitionPayload::Session(complete_session(2)))
        .unwrap();
    let (target, payload) = step(&mut disseminate, &ctx).await;

    assert_eq!(target, WorkflowState::Idle);
    match payload {
        TransitionPayload::Completed(summary) => {
            assert_eq!(summary.set_id, "SET-7");
            assert_eq!(summary.specimen_count, 2);
            assert_eq!(summary.receipts.len(), 2);
        }
        other => panic!("unexpected payload {}", other.kind_name()),
    }
    assert_eq!(
        output.generated(),
        vec![
            ("SET-7".to_string(), OutputFormat::Pdf),
            ("SET-7".to_string(), OutputFormat::Excel)
        ]
    );
    assert_eq!(input.unlock_count(), 1);

    let entries = lab.registry.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].set_id, "SET-7");
    assert!(lab.clients.load().await.unwrap().contains(&"AGREMIN SRL".to_string()));
}

#[tokio::test]
async fn test_disseminate_rejects_incomplete_session() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let mut disseminate = DisseminateState::new(
        shared_input(&ctx, &ScriptedInput::new()),
        shared_output(&ctx, &RecordingOutput::new()),
        storage(&dir),
    );

    let incomplete = TestSession::new(parameters("beam_flexural_testing", 3));
    let err = disseminate
        .enter(&ctx, TransitionPayload::Session(incomplete))
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidEntryPayload {
            state: WorkflowState::Disseminate,
            ..
        }
    ));
}

#[tokio::test]
async fn test_disseminate_output_failure_keeps_session() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new();
    let output = RecordingOutput::failing(WorkflowError::Output("disk full".into()));
    let mut disseminate = DisseminateState::new(
        shared_input(&ctx, &input),
        shared_output(&ctx, &output),
        storage(&dir),
    );

    disseminate
        .enter(&ctx, TransitionPayload::Session(complete_session(1)))
        .unwrap();
    let (target, payload) = step(&mut disseminate, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    let envelope = expect_failure(payload);
    assert_eq!(envelope.error.kind(), ErrorKind::Output);
    assert!(envelope.recoverable);
    assert!(envelope.partial_data.is_some());
    assert_eq!(input.unlock_count(), 0);
}

#[tokio::test]
async fn test_disseminate_unlock_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let input = ScriptedInput::new()
        .with_unlock_failure(WorkflowError::Device("terminal gone".into()));
    let mut disseminate = DisseminateState::new(
        shared_input(&ctx, &input),
        shared_output(&ctx, &RecordingOutput::new()),
        storage(&dir),
    );

    disseminate
        .enter(&ctx, TransitionPayload::Session(complete_session(1)))
        .unwrap();
    let (target, payload) = step(&mut disseminate, &ctx).await;

    assert_eq!(target, WorkflowState::Error);
    assert!(!expect_failure(payload).recoverable);
}

struct Wiring {
    input: ScriptedInput,
    output: RecordingOutput,
    states: StateSet,
}

fn wire(ctx: &ExecutionContext, dir: &TempDir, input: ScriptedInput) -> Wiring {
    let output = RecordingOutput::new();
    let shared_in = shared_input(ctx, &input);
    let shared_out = shared_output(ctx, &output);
    let states = StateSet {
        idle: Box::new(IdleState::new(shared_in.clone())),
        collect_input: Box::new(CollectInputState::new(shared_in.clone())),
        acquire: Box::new(AcquireState::new(Arc::new(ScriptedInstruments::new()))),
        disseminate: Box::new(DisseminateState::new(shared_in, shared_out, storage(dir))),
        error: Box::new(ErrorState::new(Arc::new(ScriptedReconnector::succeeding()))),
    };
    Wiring {
        input,
        output,
        states,
    }
}

#[tokio::test]
async fn test_orchestrator_runs_full_cycle_until_exit() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let input = ScriptedInput::new()
        .with_trigger(Trigger::Start(None))
        .with_submission(submission("cube_compression_testing", "C-3", 3));
    let wiring = wire(&ctx, &dir, input);

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    use WorkflowState::*;
    let path: Vec<(WorkflowState, WorkflowState)> = orchestrator
        .history()
        .iter()
        .map(|record| (record.from, record.to))
        .collect();
    assert_eq!(
        path,
        vec![
            (Idle, CollectInput),
            (CollectInput, Acquire),
            (Acquire, Disseminate),
            (Disseminate, Idle)
        ]
    );
    assert!(orchestrator.history().iter().all(|r| !r.forced && is_legal(r.from, r.to)));
    assert_eq!(orchestrator.current_state(), Idle);
    assert_eq!(wiring.output.generated().len(), 2);
    assert_eq!(wiring.input.unlock_count(), 1);
    assert!(sink.contains("Testing cycle completed successfully"));
}

#[tokio::test]
async fn test_orchestrator_stop_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let wiring = wire(&ctx, &dir, ScriptedInput::new().with_trigger(Trigger::Start(None)));

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    orchestrator.stop();
    orchestrator.start(&ctx).await.unwrap();

    assert!(orchestrator.history().is_empty());
    assert_eq!(orchestrator.current_state(), WorkflowState::Idle);
}

#[tokio::test]
async fn test_orchestrator_observes_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let wiring = wire(&ctx, &dir, ScriptedInput::new().with_trigger(Trigger::Start(None)));
    ctx.shutdown.trigger();

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    orchestrator.start(&ctx).await.unwrap();
    assert!(orchestrator.history().is_empty());
}

#[test]
fn test_orchestrator_rejects_miswired_states() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let mut wiring = wire(&ctx, &dir, ScriptedInput::new());
    wiring.states.acquire = Box::new(IdleState::new(shared_input(&ctx, &ScriptedInput::new())));

    let err = Orchestrator::new(wiring.states).err().expect("miswiring rejected");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

/// Idle that asks for an edge the table forbids, then stops
struct RogueIdle {
    executions: usize,
}

#[async_trait]
impl StateStrategy for RogueIdle {
    fn state(&self) -> WorkflowState {
        WorkflowState::Idle
    }

    fn enter(&mut self, _ctx: &ExecutionContext, _payload: TransitionPayload) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn execute(&mut self, _ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        self.executions += 1;
        if self.executions == 1 {
            Ok(Transition::to(WorkflowState::Disseminate, TransitionPayload::Empty))
        } else {
            Ok(Transition::Stop)
        }
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {}

    fn can_transition_to(&self, _ctx: &ExecutionContext, _target: WorkflowState) -> bool {
        true
    }
}

#[tokio::test]
async fn test_illegal_transition_is_escalated_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let mut wiring = wire(&ctx, &dir, ScriptedInput::new());
    wiring.states.idle = Box::new(RogueIdle { executions: 0 });

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    let history = orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0],
        TransitionRecord {
            from: WorkflowState::Idle,
            to: WorkflowState::Error,
            payload: "failure",
            forced: true,
        }
    );
    assert_eq!(history[1].to, WorkflowState::Idle);
    assert!(!history[1].forced);
    assert!(history.iter().all(|r| r.to != WorkflowState::Disseminate));
}

#[tokio::test]
async fn test_force_transition_bypasses_table() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(RecordingSink::new());
    let wiring = wire(&ctx, &dir, ScriptedInput::new());

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    assert!(!orchestrator.valid_transitions().contains(&WorkflowState::Disseminate));

    orchestrator
        .force_transition(
            &ctx,
            WorkflowState::Disseminate,
            TransitionPayload::Session(complete_session(1)),
        )
        .unwrap();
    assert_eq!(orchestrator.current_state(), WorkflowState::Disseminate);
    assert!(orchestrator.history()[0].forced);
    assert_eq!(
        orchestrator.valid_transitions(),
        vec![WorkflowState::Idle, WorkflowState::Error]
    );
}

#[tokio::test]
async fn test_persistent_input_failure_ends_in_idle() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let mut input = ScriptedInput::new().with_trigger(Trigger::Start(None));
    for _ in 0..=MAX_AUTOMATIC_RECOVERIES + 1 {
        input = input.with_collect_failure(WorkflowError::Device("terminal not responding".into()));
    }
    let wiring = wire(&ctx, &dir, input);

    let mut orchestrator = Orchestrator::new(wiring.states).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    let history = orchestrator.history();
    let failures = history
        .iter()
        .filter(|r| r.from == WorkflowState::CollectInput && r.to == WorkflowState::Error)
        .count();
    // every automatic attempt, one manual retry, then the fallback
    assert_eq!(failures as u32, MAX_AUTOMATIC_RECOVERIES + 2);
    let last = history.last().expect("transitions recorded");
    assert_eq!((last.from, last.to), (WorkflowState::Error, WorkflowState::Idle));
    assert_eq!(orchestrator.current_state(), WorkflowState::Idle);
    assert!(sink.contains("Returning to idle state for safety"));
}

#[derive(Clone, Default)]
struct Calls {
    enters: Arc<std::sync::atomic::AtomicUsize>,
    exits: Arc<std::sync::atomic::AtomicUsize>,
    payloads: Arc<std::sync::Mutex<Vec<TransitionPayload>>>,
}

impl Calls {
    fn enters(&self) -> usize {
        self.enters.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn exits(&self) -> usize {
        self.exits.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// State replaying scripted execute outcomes, then stopping
struct ScriptedState {
    state: WorkflowState,
    outcomes: std::collections::VecDeque<Result<Transition, WorkflowError>>,
    refused: Vec<WorkflowState>,
    entry_error: Option<WorkflowError>,
    shutdown_on_execute: bool,
    calls: Calls,
}

impl ScriptedState {
    fn new(state: WorkflowState) -> Self {
        Self {
            state,
            outcomes: Default::default(),
            refused: Vec::new(),
            entry_error: None,
            shutdown_on_execute: false,
            calls: Calls::default(),
        }
    }

    fn then(mut self, outcome: Result<Transition, WorkflowError>) -> Self {
        self.outcomes.push_back(outcome);
        self
    }
}

#[async_trait]
impl StateStrategy for ScriptedState {
    fn state(&self) -> WorkflowState {
        self.state
    }

    fn enter(&mut self, _ctx: &ExecutionContext, payload: TransitionPayload) -> Result<(), WorkflowError> {
        if let Some(error) = &self.entry_error {
            return Err(error.clone());
        }
        self.calls.enters.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.calls.payloads.lock().unwrap().push(payload);
        Ok(())
    }

    async fn execute(&mut self, ctx: &ExecutionContext) -> Result<Transition, WorkflowError> {
        if self.shutdown_on_execute {
            ctx.shutdown.trigger();
        }
        self.outcomes.pop_front().unwrap_or(Ok(Transition::Stop))
    }

    fn exit(&mut self, _ctx: &ExecutionContext) {
        self.calls.exits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn can_transition_to(&self, _ctx: &ExecutionContext, target: WorkflowState) -> bool {
        !self.refused.contains(&target)
    }
}

fn scripted_set(idle: ScriptedState, collect_input: ScriptedState, error: Box<dyn StateStrategy>) -> StateSet {
    StateSet {
        idle: Box::new(idle),
        collect_input: Box::new(collect_input),
        acquire: Box::new(ScriptedState::new(WorkflowState::Acquire)),
        disseminate: Box::new(ScriptedState::new(WorkflowState::Disseminate)),
        error,
    }
}

fn real_error_state() -> Box<dyn StateStrategy> {
    Box::new(ErrorState::new(Arc::new(ScriptedReconnector::succeeding())))
}

#[tokio::test]
async fn test_escaped_execute_error_is_forced_into_error() {
    let sink = RecordingSink::new();
    let ctx = test_context(sink.clone());
    let idle = ScriptedState::new(WorkflowState::Idle)
        .then(Err(WorkflowError::StateMachine("idle lost its input".into())));
    let idle_calls = idle.calls.clone();
    let set = scripted_set(idle, ScriptedState::new(WorkflowState::CollectInput), real_error_state());

    let mut orchestrator = Orchestrator::new(set).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    let path: Vec<(WorkflowState, WorkflowState, bool)> = orchestrator
        .history()
        .iter()
        .map(|r| (r.from, r.to, r.forced))
        .collect();
    assert_eq!(
        path,
        vec![
            (WorkflowState::Idle, WorkflowState::Error, true),
            (WorkflowState::Error, WorkflowState::Idle, false)
        ]
    );
    assert!(sink.contains("idle lost its input"));
    assert_eq!(idle_calls.enters(), 2);
    assert_eq!(idle_calls.exits(), 2);
}

#[tokio::test]
async fn test_vetoed_transition_is_escalated() {
    let ctx = test_context(RecordingSink::new());
    let mut idle = ScriptedState::new(WorkflowState::Idle).then(Ok(Transition::to(
        WorkflowState::CollectInput,
        TransitionPayload::Empty,
    )));
    idle.refused.push(WorkflowState::CollectInput);
    let collect = ScriptedState::new(WorkflowState::CollectInput);
    let collect_calls = collect.calls.clone();
    let set = scripted_set(idle, collect, real_error_state());

    let mut orchestrator = Orchestrator::new(set).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    let history = orchestrator.history();
    assert_eq!(history[0].to, WorkflowState::Error);
    assert!(history[0].forced);
    assert!(history.iter().all(|r| r.to != WorkflowState::CollectInput));
    assert_eq!(collect_calls.enters(), 0);
}

#[tokio::test]
async fn test_current_state_is_exited_on_shutdown() {
    let ctx = test_context(RecordingSink::new());
    let idle = ScriptedState::new(WorkflowState::Idle).then(Ok(Transition::to(
        WorkflowState::CollectInput,
        TransitionPayload::Empty,
    )));
    let mut collect = ScriptedState::new(WorkflowState::CollectInput).then(Ok(Transition::to(
        WorkflowState::CollectInput,
        TransitionPayload::Empty,
    )));
    collect.shutdown_on_execute = true;
    let collect_calls = collect.calls.clone();
    let set = scripted_set(idle, collect, real_error_state());

    let mut orchestrator = Orchestrator::new(set).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    assert_eq!(orchestrator.current_state(), WorkflowState::CollectInput);
    // one exit for the self-transition, one on the way out
    assert_eq!(collect_calls.enters(), 2);
    assert_eq!(collect_calls.exits(), 2);
}

#[tokio::test]
async fn test_failed_entry_is_reported_from_the_previous_state() {
    let ctx = test_context(RecordingSink::new());
    let mut partial = TestSession::new(parameters("beam_flexural_testing", 3));
    partial
        .push_specimen(complete_session(1).specimens()[0].clone())
        .unwrap();

    let idle = ScriptedState::new(WorkflowState::Idle).then(Ok(Transition::to(
        WorkflowState::CollectInput,
        TransitionPayload::Empty,
    )));
    let collect = ScriptedState::new(WorkflowState::CollectInput).then(Ok(Transition::to(
        WorkflowState::Acquire,
        TransitionPayload::Session(partial),
    )));
    let collect_calls = collect.calls.clone();
    let mut acquire = ScriptedState::new(WorkflowState::Acquire);
    acquire.entry_error = Some(WorkflowError::Configuration("press not configured".into()));
    let acquire_calls = acquire.calls.clone();
    let error = ScriptedState::new(WorkflowState::Error);
    let error_calls = error.calls.clone();

    let mut set = scripted_set(idle, collect, Box::new(error));
    set.acquire = Box::new(acquire);
    let mut orchestrator = Orchestrator::new(set).unwrap();
    orchestrator.start(&ctx).await.unwrap();

    let last = orchestrator.history().last().expect("transitions recorded").clone();
    assert_eq!((last.from, last.to, last.forced), (WorkflowState::CollectInput, WorkflowState::Error, true));
    assert!(orchestrator.history().iter().all(|r| r.to != WorkflowState::Acquire));
    assert_eq!(acquire_calls.exits(), 0);
    assert_eq!(collect_calls.exits(), 1);

    let mut payloads = error_calls.payloads.lock().unwrap();
    let envelope = expect_failure(payloads.remove(0));
    assert_eq!(envelope.source_state, WorkflowState::CollectInput);
    assert!(!envelope.recoverable);
    assert_eq!(envelope.error, WorkflowError::Configuration("press not configured".into()));
    assert_eq!(envelope.partial_data.map(|s| s.specimens().len()), Some(1));
}
