//! End-to-end behaviour of acquisition runs against simulated hardware.

mod support;

use optodaq_core::{CaptureKind, ReadMode, StepTag};
use optodaq_driver_mock::{ErrorConfig, ErrorScenario, OP_ACQUIRE};
use optodaq_experiment::{
    AcquisitionController, AcquisitionRun, FailureKind, RunParameters, RunState, TaskArbiter,
};
use std::sync::Arc;
use support::{drain, image, mock_instrument, spectral, ScriptedSource, GEOMETRY};

fn failure(state: RunState) -> optodaq_experiment::RunFailure {
    match state {
        RunState::Failed(failure) => failure,
        other => panic!("expected a failed run, got {other}"),
    }
}

#[tokio::test]
async fn test_spectral_run_publishes_every_step_in_order() {
    let (instrument, probe) = mock_instrument(ErrorConfig::none());
    let controller = AcquisitionController::new(instrument, TaskArbiter::new("lui"));

    let (run, mut progress) = controller.start(RunParameters::new(3)).unwrap();
    let seen = drain(&mut progress).await;

    assert_eq!(run.wait().await, RunState::Completed);
    let steps: Vec<_> = seen.iter().map(|(note, _)| note.step).collect();
    assert_eq!(steps, (0..=3).map(StepTag::Step).collect::<Vec<_>>());
    let seqs: Vec<_> = seen.iter().map(|(note, _)| note.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    for (note, frame) in &seen {
        assert_eq!(note.run_id, run.id());
        assert_eq!(note.read_mode, ReadMode::Spectral);
        assert!(frame.buffer.as_slice().iter().all(|&v| v == 8));
    }
    // dark plus one flash per step
    assert_eq!(probe.frame_count(), 5);
}

#[tokio::test]
async fn test_blank_is_applied_after_dark() {
    let (instrument, _) = mock_instrument(ErrorConfig::none());
    let controller = AcquisitionController::new(instrument, TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(spectral(20)));

    let (run, mut progress) = controller.start(RunParameters::new(1)).unwrap();
    let seen = drain(&mut progress).await;

    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(seen.len(), 2);
    for (_, frame) in &seen {
        assert!(frame.buffer.as_slice().iter().all(|&v| v == 12));
    }
}

#[tokio::test]
async fn test_excitation_adds_one_leading_notification() {
    let (instrument, probe) = mock_instrument(ErrorConfig::none());
    let controller = AcquisitionController::new(instrument, TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(spectral(20)));

    let params = RunParameters::new(2).with_excite(true);
    let (run, mut progress) = controller.start(params).unwrap();
    let seen = drain(&mut progress).await;

    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(seen.len() as u64, params.expected_notifications());
    assert_eq!(seen[0].0.step, StepTag::Excitation);
    assert_eq!(seen[0].0.seq, 0);
    assert_eq!(seen[1].0.step, StepTag::Step(0));
    assert_eq!(probe.frame_count(), 5);
}

#[tokio::test]
async fn test_excitation_frame_is_dark_then_blank_corrected() {
    let (source, release) = ScriptedSource::new(2, 10, 15, 50).holding_step(1);
    let source = Arc::new(source);
    let controller = AcquisitionController::new(source.clone(), TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(spectral(20)));

    let params = RunParameters::new(2).with_excite(true);
    let (run, mut progress) = controller.start(params).unwrap();

    // the first step capture is held, so the excitation frame is still in its slot
    let note = progress.recv().await.unwrap();
    assert_eq!(note.step, StepTag::Excitation);
    let frame = progress.frame(&note).unwrap();
    assert_eq!(frame.seq, note.seq);
    // blank 20 - (trans 15 - dark 2)
    assert!(frame.buffer.as_slice().iter().all(|&v| v == 7));

    release.send(()).unwrap();
    let rest = drain(&mut progress).await;
    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(rest.len(), 3);
    for (_, frame) in &rest {
        assert!(frame.buffer.as_slice().iter().all(|&v| v == 12));
    }
    assert_eq!(
        source.log(),
        vec![
            CaptureKind::Dark,
            CaptureKind::Trans,
            CaptureKind::Flash,
            CaptureKind::Flash,
            CaptureKind::Flash,
        ]
    );
}

#[tokio::test]
async fn test_cancel_during_step_stops_at_next_checkpoint() {
    let (source, gate) = ScriptedSource::new(2, 10, 15, 50).cancelling_on(2).gated();
    let source = Arc::new(source);

    let (run, mut progress) = AcquisitionRun::new(source.clone(), RunParameters::new(9))
        .spawn()
        .unwrap();
    source.arm(run.cancel_token());
    gate.send(()).unwrap();

    let seen = drain(&mut progress).await;
    assert_eq!(run.wait().await, RunState::Cancelled);
    // step 1 was in flight when the cancel arrived and is still published
    assert_eq!(seen.len(), 2);
    assert_eq!(
        source.log(),
        vec![CaptureKind::Dark, CaptureKind::Flash, CaptureKind::Flash]
    );
    assert!(!run.cancel());
}

#[tokio::test]
async fn test_cancel_before_first_step_publishes_nothing() {
    let (source, gate) = ScriptedSource::new(2, 10, 15, 50).gated();
    let source = Arc::new(source);

    let params = RunParameters::new(4).with_excite(true);
    let (run, mut progress) = AcquisitionRun::new(source.clone(), params)
        .spawn()
        .unwrap();
    assert!(run.cancel());
    assert_eq!(run.state(), RunState::CancelRequested);
    gate.send(()).unwrap();

    let seen = drain(&mut progress).await;
    assert_eq!(run.wait().await, RunState::Cancelled);
    assert!(seen.is_empty());
    assert_eq!(source.log(), vec![CaptureKind::Dark]);
}

#[tokio::test]
async fn test_cancel_after_last_checkpoint_still_completes() {
    let (source, gate) = ScriptedSource::new(2, 10, 15, 50).cancelling_on(3).gated();
    let source = Arc::new(source);

    let (run, mut progress) = AcquisitionRun::new(source.clone(), RunParameters::new(2))
        .spawn()
        .unwrap();
    let token = run.cancel_token();
    source.arm(token.clone());
    gate.send(()).unwrap();

    let seen = drain(&mut progress).await;
    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(seen.len(), 3);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_device_error_on_second_step_fails_run() {
    let errors = ErrorConfig::scenario(ErrorScenario::FailAfterN {
        operation: OP_ACQUIRE,
        count: 2,
    });
    let (instrument, probe) = mock_instrument(errors.clone());
    let controller = AcquisitionController::new(instrument, TaskArbiter::new("lui"));

    let (run, mut progress) = controller.start(RunParameters::new(3)).unwrap();
    let seen = drain(&mut progress).await;

    let failure = failure(run.wait().await);
    assert_eq!(failure.kind, FailureKind::Device);
    assert_eq!(failure.capture, Some(CaptureKind::Flash));
    assert_eq!(failure.step, Some(StepTag::Step(1)));
    assert_eq!(seen.len(), 1);
    assert_eq!(probe.frame_count(), 2);
    // nothing is attempted after the failing capture
    assert_eq!(errors.calls(OP_ACQUIRE), 3);
    assert!(controller.arbiter().is_free());
}

#[tokio::test]
async fn test_mismatched_blank_fails_before_publishing() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50));
    let controller = AcquisitionController::new(source.clone(), TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(image(20)));

    let (run, mut progress) = controller.start(RunParameters::new(3)).unwrap();
    let seen = drain(&mut progress).await;

    let failure = failure(run.wait().await);
    assert_eq!(failure.kind, FailureKind::ShapeMismatch);
    assert_eq!(failure.step, Some(StepTag::Step(0)));
    assert!(seen.is_empty());
    assert_eq!(source.log(), vec![CaptureKind::Dark, CaptureKind::Flash]);
}

#[tokio::test]
async fn test_mismatched_blank_fails_excitation() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50));
    let controller = AcquisitionController::new(source.clone(), TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(image(20)));

    let params = RunParameters::new(3).with_excite(true);
    let (run, mut progress) = controller.start(params).unwrap();
    assert!(drain(&mut progress).await.is_empty());

    let failure = failure(run.wait().await);
    assert_eq!(failure.kind, FailureKind::ShapeMismatch);
    assert_eq!(failure.capture, Some(CaptureKind::Trans));
    assert_eq!(failure.step, Some(StepTag::Excitation));
}

#[tokio::test]
async fn test_image_run_applies_dark_only() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50));
    let controller = AcquisitionController::new(source.clone(), TaskArbiter::new("lui"));
    controller.set_blank_reference(Some(image(20)));

    let params = RunParameters::new(1).with_read_mode(ReadMode::Image);
    let (run, mut progress) = controller.start(params).unwrap();
    let seen = drain(&mut progress).await;

    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(seen.len(), 2);
    for (note, frame) in &seen {
        assert_eq!(note.read_mode, ReadMode::Image);
        assert_eq!(frame.buffer.width(), GEOMETRY.width);
        assert_eq!(frame.buffer.height(), GEOMETRY.height);
        assert!(frame.buffer.as_slice().iter().all(|&v| v == 48));
    }
    assert_eq!(
        source.log(),
        vec![CaptureKind::Dark, CaptureKind::Image, CaptureKind::Image]
    );
}

#[tokio::test]
async fn test_image_capture_failure_reports_step() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50).failing_on(1));
    let controller = AcquisitionController::new(source, TaskArbiter::new("lui"));

    let params = RunParameters::new(5).with_read_mode(ReadMode::Image);
    let (run, mut progress) = controller.start(params).unwrap();
    assert!(drain(&mut progress).await.is_empty());

    let failure = failure(run.wait().await);
    assert_eq!(failure.kind, FailureKind::Device);
    assert_eq!(failure.capture, Some(CaptureKind::Image));
    assert_eq!(failure.step, Some(StepTag::Step(0)));
    assert!(failure.message.contains("step 0"));
}

#[tokio::test]
async fn test_lease_released_before_channel_closes() {
    let (instrument, _) = mock_instrument(ErrorConfig::none());
    let controller = AcquisitionController::new(instrument, TaskArbiter::new("lui"));

    let (run, mut progress) = controller.start(RunParameters::new(2)).unwrap();
    assert!(!controller.arbiter().is_free());
    drain(&mut progress).await;

    // channel closed: the terminal state and the free instrument are both visible
    assert!(run.is_finished());
    assert!(controller.arbiter().is_free());

    let (next, mut progress) = controller.start(RunParameters::new(0)).unwrap();
    assert_eq!(drain(&mut progress).await.len(), 1);
    assert_eq!(next.wait().await, RunState::Completed);
    assert_ne!(next.id(), run.id());
}

#[tokio::test]
async fn test_failed_run_can_be_retried() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50).failing_on(2));
    let controller = AcquisitionController::new(source.clone(), TaskArbiter::new("lui"));

    let (first, mut progress) = controller.start(RunParameters::new(2)).unwrap();
    drain(&mut progress).await;
    assert!(matches!(first.wait().await, RunState::Failed(_)));

    let (second, mut progress) = controller.start(RunParameters::new(2)).unwrap();
    assert_eq!(drain(&mut progress).await.len(), 3);
    assert_eq!(second.wait().await, RunState::Completed);
    // every run takes its own dark
    let darks = source
        .log()
        .into_iter()
        .filter(|kind| *kind == CaptureKind::Dark)
        .count();
    assert_eq!(darks, 2);
}

#[test]
fn test_run_completes_without_a_consumer() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50));
    let (run, progress) = AcquisitionRun::new(source, RunParameters::new(2))
        .spawn()
        .unwrap();
    drop(progress);

    let summary = run.join().unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.notifications, 3);
    assert_eq!(summary.run_id, run.id());
    assert!(summary.finished_at >= summary.started_at);
    assert!(run.join().is_none());
}

#[test]
fn test_blocking_consumer_sees_every_notification() {
    let source = Arc::new(ScriptedSource::new(2, 10, 15, 50));
    let (run, mut progress) = AcquisitionRun::new(source, RunParameters::new(4))
        .with_blank(Some(Arc::new(spectral(20))))
        .spawn()
        .unwrap();

    let mut steps = Vec::new();
    while let Some(note) = progress.blocking_recv() {
        let frame = progress.frame(&note).unwrap();
        assert!(frame.seq >= note.seq);
        assert!(frame.buffer.as_slice().iter().all(|&v| v == 12));
        steps.push(note.step);
    }
    assert_eq!(steps, (0..=4).map(StepTag::Step).collect::<Vec<_>>());
    assert_eq!(run.join().unwrap().state, RunState::Completed);
}

#[tokio::test]
async fn test_factory_built_instrument_runs_end_to_end() {
    let controller =
        AcquisitionController::new(support::factory_instrument(), TaskArbiter::new("lui"));

    let params = RunParameters::new(2).with_excite(true);
    let (run, mut progress) = controller
        .start_with_prompts(params, &optodaq_experiment::AutoConfirm)
        .unwrap();
    let seen = drain(&mut progress).await;

    assert_eq!(run.wait().await, RunState::Completed);
    assert_eq!(seen.len(), 4);
    // flat lamp: the sample equals the blank
    let (_, last) = seen.last().unwrap();
    assert!(last.buffer.as_slice().iter().all(|&v| v == 0));
}
