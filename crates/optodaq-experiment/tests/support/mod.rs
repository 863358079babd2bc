//! Shared test doubles.

#![allow(dead_code)]

use optodaq_core::{
    AcquisitionSettings, CaptureKind, DetectorGeometry, DriverError, DriverErrorKind,
    FrameBuffer, FrameSource, ReadMode,
};
use optodaq_driver_mock::{
    build_commander, CameraProbe, DriverKind, ErrorConfig, MockBeamFlags, MockCamera,
    MockDetectorConfig, MockMode, ShutterState, SignalLevels,
};
use optodaq_experiment::{
    CancelToken, OperatorPrompt, Progress, ProgressReceiver, PromptKind, PromptResponse,
    PublishedFrame,
};
use optodaq_core::Commander;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

pub const GEOMETRY: DetectorGeometry = DetectorGeometry {
    width: 8,
    height: 2,
};

/// Mock instrument with flat illumination: dark 2, flash 10, trans 15.
pub fn mock_instrument(errors: ErrorConfig) -> (Arc<Commander>, CameraProbe) {
    let shutters = ShutterState::new();
    let camera = MockCamera::builder()
        .geometry(GEOMETRY)
        .levels(SignalLevels {
            dark: 2,
            lamp: 8,
            laser: 5,
        })
        .error_config(errors.clone())
        .shutters(shutters.clone())
        .build();
    let probe = camera.probe();
    let flags = MockBeamFlags::new(shutters).with_error_config(errors);
    (
        Arc::new(Commander::new(Box::new(camera), Box::new(flags))),
        probe,
    )
}

/// Instant mock built through the factory.
pub fn factory_instrument() -> Arc<Commander> {
    let config = MockDetectorConfig {
        width: GEOMETRY.width,
        height: GEOMETRY.height,
        mode: MockMode::Instant,
        profiled: false,
        ..Default::default()
    };
    Arc::new(build_commander(DriverKind::Mock, &config).expect("valid mock config"))
}

pub fn spectral(value: i32) -> FrameBuffer {
    FrameBuffer::filled(GEOMETRY, ReadMode::Spectral, value)
}

pub fn image(value: i32) -> FrameBuffer {
    FrameBuffer::filled(GEOMETRY, ReadMode::Image, value)
}

/// Frame source returning constant frames, with hooks for failures,
/// cancellation and gating.
pub struct ScriptedSource {
    read_mode: Mutex<ReadMode>,
    values: [(CaptureKind, i32); 4],
    log: Mutex<Vec<CaptureKind>>,
    configured: AtomicUsize,
    step_captures: AtomicUsize,
    fail_on_step_capture: Option<usize>,
    cancel_on_step_capture: Option<usize>,
    cancel_token: Mutex<Option<CancelToken>>,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    step_gate: Option<(usize, Mutex<mpsc::Receiver<()>>)>,
}

impl ScriptedSource {
    pub fn new(dark: i32, flash: i32, trans: i32, image: i32) -> Self {
        Self {
            read_mode: Mutex::new(ReadMode::Spectral),
            values: [
                (CaptureKind::Dark, dark),
                (CaptureKind::Flash, flash),
                (CaptureKind::Trans, trans),
                (CaptureKind::Image, image),
            ],
            log: Mutex::new(Vec::new()),
            configured: AtomicUsize::new(0),
            step_captures: AtomicUsize::new(0),
            fail_on_step_capture: None,
            cancel_on_step_capture: None,
            cancel_token: Mutex::new(None),
            gate: None,
            step_gate: None,
        }
    }

    /// Fail the `n`-th (1-based) flash or image capture.
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_step_capture = Some(n);
        self
    }

    /// Cancel the run while the `n`-th (1-based) flash or image capture is in flight.
    pub fn cancelling_on(mut self, n: usize) -> Self {
        self.cancel_on_step_capture = Some(n);
        self
    }

    /// Block every dark capture until a token arrives on the returned sender.
    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Mutex::new(rx));
        (self, tx)
    }

    /// Block the `n`-th (1-based) flash or image capture until a token arrives.
    pub fn holding_step(mut self, n: usize) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.step_gate = Some((n, Mutex::new(rx)));
        (self, tx)
    }

    pub fn arm(&self, token: CancelToken) {
        *self.cancel_token.lock() = Some(token);
    }

    pub fn log(&self) -> Vec<CaptureKind> {
        self.log.lock().clone()
    }

    pub fn configured(&self) -> usize {
        self.configured.load(Ordering::SeqCst)
    }

    fn value(&self, kind: CaptureKind) -> i32 {
        self.values
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
            .unwrap_or_default()
    }

    fn produce(&self, kind: CaptureKind) -> Result<FrameBuffer, DriverError> {
        if kind == CaptureKind::Dark {
            if let Some(gate) = &self.gate {
                gate.lock().recv().ok();
            }
        }
        if matches!(kind, CaptureKind::Flash | CaptureKind::Image) {
            let n = self.step_captures.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((held, gate)) = &self.step_gate {
                if *held == n {
                    gate.lock().recv().ok();
                }
            }
            if self.fail_on_step_capture == Some(n) {
                return Err(DriverError::new(
                    "scripted",
                    DriverErrorKind::Hardware,
                    format!("scripted failure on capture {}", n),
                ));
            }
            if self.cancel_on_step_capture == Some(n) {
                if let Some(token) = self.cancel_token.lock().as_ref() {
                    token.cancel();
                }
            }
        }
        self.log.lock().push(kind);

        let read_mode = match kind {
            CaptureKind::Image => ReadMode::Image,
            _ => *self.read_mode.lock(),
        };
        Ok(FrameBuffer::filled(GEOMETRY, read_mode, self.value(kind)))
    }
}

impl FrameSource for ScriptedSource {
    fn configure(&self, settings: &AcquisitionSettings) -> Result<(), DriverError> {
        *self.read_mode.lock() = settings.read_mode;
        self.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn geometry(&self) -> DetectorGeometry {
        GEOMETRY
    }

    fn capture_dark(&self) -> Result<FrameBuffer, DriverError> {
        self.produce(CaptureKind::Dark)
    }

    fn capture_flash(&self) -> Result<FrameBuffer, DriverError> {
        self.produce(CaptureKind::Flash)
    }

    fn capture_trans(&self) -> Result<FrameBuffer, DriverError> {
        self.produce(CaptureKind::Trans)
    }

    fn capture_image(&self) -> Result<FrameBuffer, DriverError> {
        self.produce(CaptureKind::Image)
    }
}

/// Prompt answering from a script and recording what was asked.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<PromptResponse>>,
    asked: Mutex<Vec<PromptKind>>,
}

impl ScriptedPrompt {
    pub fn answering(answers: &[PromptResponse]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<PromptKind> {
        self.asked.lock().clone()
    }
}

impl OperatorPrompt for ScriptedPrompt {
    fn confirm(&self, prompt: PromptKind) -> PromptResponse {
        self.asked.lock().push(prompt);
        self.answers
            .lock()
            .pop_front()
            .unwrap_or(PromptResponse::Cancel)
    }
}

/// Receive every notification until the channel closes.
pub async fn drain(progress: &mut ProgressReceiver) -> Vec<(Progress, Arc<PublishedFrame>)> {
    let mut seen = Vec::new();
    while let Some(note) = progress.recv().await {
        let frame = progress.frame(&note).expect("slot filled before notification");
        seen.push((note, frame));
    }
    seen
}
