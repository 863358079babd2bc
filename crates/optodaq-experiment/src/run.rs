//! Acquisition run: one cancellable pass through the capture sequence.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  spawn()  ┌─────────┐  cancel()  ┌─────────────────┐
//! │ Idle │──────────▶│ Running │───────────▶│ CancelRequested │
//! └──────┘           └────┬────┘            └────────┬────────┘
//!                         │                          │ next checkpoint
//!        ┌────────────────┼──────────────┐           ▼
//!        ▼ last step      ▼ capture or   │      ┌───────────┐
//!  ┌───────────┐   correction fails      └─────▶│ Cancelled │
//!  │ Completed │   ┌────────┐                   └───────────┘
//!  └───────────┘   │ Failed │
//!                  └────────┘
//! ```
//!
//! # Sequence
//!
//! 1. Dark reference, unconditionally (never reused from an earlier run)
//! 2. If `excite`: checkpoint, one trans capture, dark then blank correction, one
//!    notification
//! 3. For `step` in `0..=n_steps`: checkpoint, one flash (spectral) or full image
//!    (image) capture, dark then blank correction (dark only for images), one
//!    notification
//!
//! A checkpoint observes the cancellation flag. Captures already in flight are never
//! interrupted, so a cancellation requested after the last checkpoint still ends in
//! `Completed`.
//!
//! # Threading
//!
//! Each run executes on its own named OS thread: every capture blocks for the
//! duration of the detector readout and a driver that hangs blocks the run
//! indefinitely. The thread owns the dark reference, the instrument lease and the
//! sending half of the progress channel. The lease is released before the terminal
//! state is published, and the progress channel closes after it, so a consumer that
//! sees either can immediately start the next run.

use crate::arbitration::TaskLease;
use crate::progress::{self, ProgressReceiver, ProgressSender};
use chrono::{DateTime, Utc};
use optodaq_core::{
    correction, AcquisitionMode, AcquisitionSettings, AppResult, CaptureKind, DaqError,
    FrameBuffer, FrameSource, ReadMode, StepTag, TriggerMode,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

// =============================================================================
// Identifiers and parameters
// =============================================================================

/// Unique identifier of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    fn short(&self) -> String {
        let mut text = self.0.as_simple().to_string();
        text.truncate(8);
        text
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What to acquire. Fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    /// Index of the last step; the loop captures `n_steps + 1` frames
    pub n_steps: u32,
    /// Detector sequencing mode
    pub acquisition_mode: AcquisitionMode,
    /// Spectral trace or full image
    pub read_mode: ReadMode,
    /// Exposure trigger source
    pub trigger_mode: TriggerMode,
    /// Take one excitation capture before the step loop
    pub excite: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            n_steps: 0,
            acquisition_mode: AcquisitionMode::Single,
            read_mode: ReadMode::Spectral,
            trigger_mode: TriggerMode::ExternalExposure,
            excite: false,
        }
    }
}

impl RunParameters {
    /// Single external-exposure spectral run with steps `0..=n_steps`.
    pub fn new(n_steps: u32) -> Self {
        Self {
            n_steps,
            ..Default::default()
        }
    }

    /// Select the read mode.
    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    /// Select the acquisition mode.
    pub fn with_acquisition_mode(mut self, mode: AcquisitionMode) -> Self {
        self.acquisition_mode = mode;
        self
    }

    /// Select the trigger mode.
    pub fn with_trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.trigger_mode = mode;
        self
    }

    /// Request the excitation capture.
    pub fn with_excite(mut self, excite: bool) -> Self {
        self.excite = excite;
        self
    }

    /// Modes to issue to the detector before the run.
    pub fn settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            acquisition_mode: self.acquisition_mode,
            trigger_mode: self.trigger_mode,
            read_mode: self.read_mode,
        }
    }

    /// Notifications an uncancelled, successful run emits.
    pub fn expected_notifications(&self) -> u64 {
        u64::from(self.n_steps) + 1 + u64::from(self.excite)
    }

    /// Capture primitive used inside the step loop.
    pub fn step_capture(&self) -> CaptureKind {
        match self.read_mode {
            ReadMode::Spectral => CaptureKind::Flash,
            ReadMode::Image => CaptureKind::Image,
        }
    }
}

// =============================================================================
// States
// =============================================================================

/// Broad cause of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A reference did not match the frame shape
    ShapeMismatch,
    /// The detector or a beam flag failed
    Device,
    /// The run thread ended abnormally
    Other,
}

/// Why a run failed, with enough context to tell the operator where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// Broad cause
    pub kind: FailureKind,
    /// Capture that was executing or being corrected
    pub capture: Option<CaptureKind>,
    /// Position in the run
    pub step: Option<StepTag>,
    /// Rendered error
    pub message: String,
}

impl RunFailure {
    fn from_error(err: &DaqError, capture: CaptureKind, step: StepTag) -> Self {
        let kind = match err {
            DaqError::ShapeMismatch { .. } => FailureKind::ShapeMismatch,
            DaqError::Device { .. } => FailureKind::Device,
            _ => FailureKind::Other,
        };
        Self {
            kind,
            capture: Some(capture),
            step: Some(step),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    /// Not started
    #[default]
    Idle,
    /// Capturing
    Running,
    /// Cancellation requested; the run stops at its next checkpoint
    CancelRequested,
    /// Stopped at a checkpoint on request
    Cancelled,
    /// Every scheduled capture was published
    Completed,
    /// A capture or correction failed
    Failed(RunFailure),
}

impl RunState {
    /// True for `Cancelled`, `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Cancelled | RunState::Completed | RunState::Failed(_)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::CancelRequested => write!(f, "cancel requested"),
            RunState::Cancelled => write!(f, "cancelled"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: RunId,
    /// Notifications emitted
    pub notifications: u64,
    /// Terminal state
    pub state: RunState,
    /// Thread start
    pub started_at: DateTime<Utc>,
    /// Terminal transition
    pub finished_at: DateTime<Utc>,
}

// =============================================================================
// Cancellation and handles
// =============================================================================

/// Cloneable cancellation trigger for one run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    run_id: RunId,
    flag: Arc<AtomicBool>,
    state: Arc<watch::Sender<RunState>>,
}

impl CancelToken {
    /// Ask the run to stop at its next checkpoint.
    ///
    /// Returns `true` for the request that set the flag; repeated requests are
    /// logged and ignored.
    pub fn cancel(&self) -> bool {
        if self.flag.swap(true, Ordering::SeqCst) {
            warn!(run_id = %self.run_id, "Cancellation already requested");
            return false;
        }
        let marked = self.state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::CancelRequested;
                true
            } else {
                false
            }
        });
        if marked {
            info!(run_id = %self.run_id, "Cancellation requested");
        } else {
            debug!(run_id = %self.run_id, "Cancellation requested after run finished");
        }
        true
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Consumer-side handle to a spawned run.
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    token: CancelToken,
    state_rx: watch::Receiver<RunState>,
    thread: Mutex<Option<JoinHandle<RunSummary>>>,
}

impl RunHandle {
    /// Run identifier.
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Request cancellation. See [`CancelToken::cancel`].
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    /// A token that can cancel this run from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        self.state_rx.borrow().clone()
    }

    /// True once the run has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state_rx.borrow().is_terminal()
    }

    /// Wait for the terminal state.
    pub async fn wait(&self) -> RunState {
        let mut rx = self.state_rx.clone();
        let state = match rx.wait_for(RunState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Block until the run thread exits and return its summary.
    ///
    /// Returns `None` if the thread was already joined or panicked; in the latter
    /// case the run's state is `Failed`.
    pub fn join(&self) -> Option<RunSummary> {
        let thread = self.thread.lock().take()?;
        match thread.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!(run_id = %self.id, "Acquisition thread panicked");
                None
            }
        }
    }
}

// =============================================================================
// Run construction
// =============================================================================

/// A run that has not been started yet.
///
/// The detector must already be configured for `params.settings()`;
/// [`AcquisitionController`](crate::AcquisitionController) does this before
/// spawning.
pub struct AcquisitionRun {
    id: RunId,
    params: RunParameters,
    source: Arc<dyn FrameSource>,
    blank: Option<Arc<FrameBuffer>>,
    lease: Option<TaskLease>,
}

impl AcquisitionRun {
    /// A run of `params` against `source`, without blank reference or lease.
    pub fn new(source: Arc<dyn FrameSource>, params: RunParameters) -> Self {
        Self {
            id: RunId::new(),
            params,
            source,
            blank: None,
            lease: None,
        }
    }

    /// Blank reference applied to spectral and excitation frames.
    pub fn with_blank(mut self, blank: Option<Arc<FrameBuffer>>) -> Self {
        self.blank = blank;
        self
    }

    /// Instrument lease held until the run terminates.
    pub fn with_lease(mut self, lease: TaskLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Identifier the run will report under.
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Start the run on its own thread.
    pub fn spawn(self) -> AppResult<(RunHandle, ProgressReceiver)> {
        let (progress_tx, progress_rx) = progress::channel();
        let (state_tx, state_rx) = watch::channel(RunState::Running);
        let state_tx = Arc::new(state_tx);
        let token = CancelToken {
            run_id: self.id,
            flag: Arc::new(AtomicBool::new(false)),
            state: state_tx.clone(),
        };

        let worker = Worker {
            lease: self.lease,
            state: StatePublisher { tx: state_tx },
            id: self.id,
            params: self.params,
            source: self.source,
            blank: self.blank,
            cancel: token.flag.clone(),
            progress: progress_tx,
        };

        let thread = std::thread::Builder::new()
            .name(format!("acq-run-{}", self.id.short()))
            .spawn(move || worker.run())?;

        Ok((
            RunHandle {
                id: self.id,
                token,
                state_rx,
                thread: Mutex::new(Some(thread)),
            },
            progress_rx,
        ))
    }
}

// =============================================================================
// Run thread
// =============================================================================

enum Outcome {
    Completed,
    Cancelled(StepTag),
}

/// Publishes the run state; marks the run failed if dropped before a terminal state.
struct StatePublisher {
    tx: Arc<watch::Sender<RunState>>,
}

impl StatePublisher {
    fn finish(&self, state: RunState) {
        self.tx.send_replace(state);
    }
}

impl Drop for StatePublisher {
    fn drop(&mut self) {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = RunState::Failed(RunFailure {
                kind: FailureKind::Other,
                capture: None,
                step: None,
                message: "acquisition thread exited without reaching a terminal state".into(),
            });
            true
        });
    }
}

// Field order matters on unwind: the lease is released before the state guard runs.
struct Worker {
    lease: Option<TaskLease>,
    state: StatePublisher,
    id: RunId,
    params: RunParameters,
    source: Arc<dyn FrameSource>,
    blank: Option<Arc<FrameBuffer>>,
    cancel: Arc<AtomicBool>,
    progress: ProgressSender,
}

impl Worker {
    fn run(mut self) -> RunSummary {
        let span = info_span!(
            "acquisition_run",
            run_id = %self.id,
            read_mode = %self.params.read_mode
        );
        let _enter = span.enter();
        let started_at = Utc::now();
        info!(
            n_steps = self.params.n_steps,
            excite = self.params.excite,
            blank = self.blank.is_some(),
            "Acquisition run started"
        );

        let terminal = match self.execute() {
            Ok(Outcome::Completed) => {
                info!(
                    notifications = self.progress.sent(),
                    "Acquisition run completed"
                );
                RunState::Completed
            }
            Ok(Outcome::Cancelled(at)) => {
                info!(
                    notifications = self.progress.sent(),
                    before = %at,
                    "Acquisition run cancelled"
                );
                RunState::Cancelled
            }
            Err(failure) => {
                error!(
                    notifications = self.progress.sent(),
                    capture = ?failure.capture,
                    step = ?failure.step,
                    error = %failure.message,
                    "Acquisition run failed"
                );
                RunState::Failed(failure)
            }
        };

        drop(self.lease.take());
        self.state.finish(terminal.clone());

        RunSummary {
            run_id: self.id,
            notifications: self.progress.sent(),
            state: terminal,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn execute(&mut self) -> Result<Outcome, RunFailure> {
        let dark = self.capture(CaptureKind::Dark, StepTag::Reference)?;

        if self.params.excite {
            if self.cancel_requested() {
                return Ok(Outcome::Cancelled(StepTag::Excitation));
            }
            let step = StepTag::Excitation;
            let mut frame = self.capture(CaptureKind::Trans, step)?;
            correction::correct(&mut frame, Some(&dark), self.blank.as_deref())
                .map_err(|e| RunFailure::from_error(&e, CaptureKind::Trans, step))?;
            self.publish(step, frame);
        }

        let capture = self.params.step_capture();
        for cnt in 0..=self.params.n_steps {
            let step = StepTag::Step(cnt);
            if self.cancel_requested() {
                return Ok(Outcome::Cancelled(step));
            }
            let mut frame = self.capture(capture, step)?;
            let blank = match self.params.read_mode {
                ReadMode::Spectral => self.blank.as_deref(),
                ReadMode::Image => None,
            };
            correction::correct(&mut frame, Some(&dark), blank)
                .map_err(|e| RunFailure::from_error(&e, capture, step))?;
            self.publish(step, frame);
        }

        Ok(Outcome::Completed)
    }

    fn capture(&self, kind: CaptureKind, step: StepTag) -> Result<FrameBuffer, RunFailure> {
        let frame = self.source.capture(kind).map_err(|source| {
            RunFailure::from_error(&DaqError::device(kind, Some(step), source), kind, step)
        })?;
        debug!(capture = %kind, step = %step, elements = frame.len(), "Frame captured");
        Ok(frame)
    }

    fn publish(&mut self, step: StepTag, frame: FrameBuffer) {
        let progress = self
            .progress
            .publish(self.id, step, self.params.read_mode, frame);
        debug!(seq = progress.seq, step = %step, "Frame published");
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
