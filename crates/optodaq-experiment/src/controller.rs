//! Per-instrument consumer facade.
//!
//! `AcquisitionController` holds what outlives a single run: the frame source, the
//! instrument's arbiter, a manually captured dark reference and the blank
//! reference. Runs always take their own dark; the blank is captured on demand and
//! reused by every run until it is recaptured or cleared.

use crate::arbitration::{TaskArbiter, TaskKind, TaskLease};
use crate::progress::ProgressReceiver;
use crate::prompt::{OperatorPrompt, PromptKind, PromptResponse};
use crate::run::{AcquisitionRun, RunHandle, RunParameters};
use optodaq_core::{
    correction, AcquisitionSettings, AppResult, CaptureKind, DaqError, FrameBuffer, FrameSource,
    ReadMode,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for consumers driving one instrument.
pub struct AcquisitionController {
    source: Arc<dyn FrameSource>,
    arbiter: Arc<TaskArbiter>,
    dark: RwLock<Option<Arc<FrameBuffer>>>,
    blank: RwLock<Option<Arc<FrameBuffer>>>,
}

impl AcquisitionController {
    /// Controller for the instrument behind `source`, gated by `arbiter`.
    pub fn new(source: Arc<dyn FrameSource>, arbiter: Arc<TaskArbiter>) -> Self {
        Self {
            source,
            arbiter,
            dark: RwLock::new(None),
            blank: RwLock::new(None),
        }
    }

    /// The instrument's arbiter.
    pub fn arbiter(&self) -> &Arc<TaskArbiter> {
        &self.arbiter
    }

    /// Capture and hold a dark reference in `read_mode`.
    ///
    /// The held dark only corrects manual blank captures; runs take their own.
    pub fn capture_dark(&self, read_mode: ReadMode) -> AppResult<Arc<FrameBuffer>> {
        let _lease = self.arbiter.try_acquire(TaskKind::Reference)?;
        self.configure(&AcquisitionSettings::single(read_mode))?;
        let dark = Arc::new(self.capture(CaptureKind::Dark)?);
        info!(read_mode = %read_mode, elements = dark.len(), "Dark reference captured");
        *self.dark.write() = Some(dark.clone());
        Ok(dark)
    }

    /// Held manual dark reference.
    pub fn dark_reference(&self) -> Option<Arc<FrameBuffer>> {
        self.dark.read().clone()
    }

    /// Capture, dark-correct and hold a blank reference in `read_mode`.
    pub fn capture_blank(&self, read_mode: ReadMode) -> AppResult<Arc<FrameBuffer>> {
        let _lease = self.arbiter.try_acquire(TaskKind::Reference)?;
        self.configure(&AcquisitionSettings::single(read_mode))?;
        self.acquire_blank(read_mode)
    }

    /// Replace the blank reference; `None` clears it.
    pub fn set_blank_reference(&self, blank: Option<FrameBuffer>) {
        *self.blank.write() = blank.map(Arc::new);
    }

    /// Held blank reference.
    pub fn blank_reference(&self) -> Option<Arc<FrameBuffer>> {
        self.blank.read().clone()
    }

    /// Forget the blank reference.
    pub fn clear_blank(&self) {
        *self.blank.write() = None;
    }

    /// One dark- and blank-corrected frame in `read_mode`, outside any run.
    ///
    /// Uses the held references as they are; either may be absent. Images are
    /// dark-corrected only. A held reference of the wrong shape is an error.
    pub fn capture_spectrum(&self, read_mode: ReadMode) -> AppResult<FrameBuffer> {
        let _lease = self.arbiter.try_acquire(TaskKind::Reference)?;
        self.configure(&AcquisitionSettings::single(read_mode))?;
        let mut frame = self.capture(exposure(read_mode))?;

        let dark = self.dark_reference();
        let blank = match read_mode {
            ReadMode::Spectral => self.blank_reference(),
            ReadMode::Image => None,
        };
        correction::correct(&mut frame, dark.as_deref(), blank.as_deref())?;
        debug!(
            read_mode = %read_mode,
            dark = dark.is_some(),
            blank = blank.is_some(),
            "Single frame captured"
        );
        Ok(frame)
    }

    /// Uncorrected full-resolution image. Detector settings and beam flags are left
    /// as they are.
    pub fn capture_snapshot(&self) -> AppResult<FrameBuffer> {
        let _lease = self.arbiter.try_acquire(TaskKind::Reference)?;
        self.capture(CaptureKind::Image)
    }

    /// Start a run with the held blank reference.
    ///
    /// Rejected with [`DaqError::InstrumentBusy`] before touching the detector when
    /// another task owns the instrument.
    pub fn start(&self, params: RunParameters) -> AppResult<(RunHandle, ProgressReceiver)> {
        let lease = self.arbiter.try_acquire(TaskKind::Kinetic)?;
        self.configure(&params.settings())?;
        self.spawn(params, lease)
    }

    /// Start a run after asking the operator to insert the blank, capturing it, and
    /// asking for confirmation to continue.
    ///
    /// A cancel at either prompt returns [`DaqError::Declined`] and no run is
    /// started. A blank captured before a declined second prompt is kept.
    pub fn start_with_prompts(
        &self,
        params: RunParameters,
        prompt: &dyn OperatorPrompt,
    ) -> AppResult<(RunHandle, ProgressReceiver)> {
        let lease = self.arbiter.try_acquire(TaskKind::Kinetic)?;
        self.configure(&params.settings())?;

        ask(prompt, PromptKind::InsertBlank)?;
        self.acquire_blank(params.read_mode)?;
        ask(prompt, PromptKind::ContinueWhenReady)?;

        self.spawn(params, lease)
    }

    /// Close the beam flags and release the detector.
    pub fn shutdown(&self) -> AppResult<()> {
        let _lease = self.arbiter.try_acquire(TaskKind::Reference)?;
        self.source.shutdown().map_err(DaqError::Setup)?;
        info!(instrument = self.arbiter.instrument(), "Instrument shut down");
        Ok(())
    }

    fn spawn(
        &self,
        params: RunParameters,
        lease: TaskLease,
    ) -> AppResult<(RunHandle, ProgressReceiver)> {
        let run = AcquisitionRun::new(self.source.clone(), params)
            .with_blank(self.blank_reference())
            .with_lease(lease);
        info!(
            instrument = self.arbiter.instrument(),
            run_id = %run.id(),
            n_steps = params.n_steps,
            read_mode = %params.read_mode,
            "Starting acquisition run"
        );
        run.spawn()
    }

    fn configure(&self, settings: &AcquisitionSettings) -> AppResult<()> {
        self.source.configure(settings).map_err(DaqError::Setup)
    }

    fn capture(&self, kind: CaptureKind) -> AppResult<FrameBuffer> {
        self.source
            .capture(kind)
            .map_err(|e| DaqError::device(kind, None, e))
    }

    /// Blank in `read_mode`, dark-corrected. Uses the held dark when it has the
    /// right shape, otherwise captures a fresh one. Caller holds the lease and has
    /// configured the read mode.
    fn acquire_blank(&self, read_mode: ReadMode) -> AppResult<Arc<FrameBuffer>> {
        let mut blank = self.capture(exposure(read_mode))?;

        let held = self.dark_reference().filter(|d| d.len() == blank.len());
        let dark = match held {
            Some(dark) => dark,
            None => Arc::new(self.capture(CaptureKind::Dark)?),
        };
        correction::apply_dark(&mut blank, Some(&dark))?;

        let blank = Arc::new(blank);
        info!(read_mode = %read_mode, elements = blank.len(), "Blank reference captured");
        *self.blank.write() = Some(blank.clone());
        Ok(blank)
    }
}

/// Illuminated capture for `read_mode`.
fn exposure(read_mode: ReadMode) -> CaptureKind {
    match read_mode {
        ReadMode::Spectral => CaptureKind::Flash,
        ReadMode::Image => CaptureKind::Image,
    }
}

fn ask(prompt: &dyn OperatorPrompt, kind: PromptKind) -> AppResult<()> {
    match prompt.confirm(kind) {
        PromptResponse::Proceed => Ok(()),
        PromptResponse::Cancel => {
            warn!(prompt = kind.title(), "Operator declined, run not started");
            Err(DaqError::Declined {
                prompt: kind.title().to_string(),
            })
        }
    }
}
