//! Simulated CCD detector.

use crate::common::{
    ErrorConfig, MockMode, MockRng, TimingConfig, OP_ACQUIRE, OP_CONFIGURE, OP_IMAGE,
};
use crate::mock_beam_flags::ShutterState;
use crate::pattern::{emission_profile, slit_profile};
use optodaq_core::{
    AcquisitionMode, AcquisitionSettings, CameraDriver, DetectorGeometry, DriverError,
    DriverErrorKind, FrameBuffer, ReadMode, TriggerMode,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

const DRIVER_TYPE: &str = "mock_camera";

/// Counts contributed by each light path. Contributions are additive: `dark` is
/// always present, `lamp` only while the lamp flag is open and `laser` only while
/// the laser flag is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalLevels {
    /// Offset present in every readout
    pub dark: i32,
    /// Peak counts from the probe lamp
    pub lamp: i32,
    /// Counts from scattered excitation light
    pub laser: i32,
}

impl Default for SignalLevels {
    fn default() -> Self {
        Self {
            dark: 100,
            lamp: 4000,
            laser: 250,
        }
    }
}

#[derive(Debug)]
struct ProbeState {
    frames: AtomicU64,
    settings: Mutex<AcquisitionSettings>,
    configure_calls: AtomicU64,
    closed: AtomicBool,
}

/// Read-only view of a [`MockCamera`] that survives handing the camera to a
/// [`Commander`](optodaq_core::Commander).
#[derive(Debug, Clone)]
pub struct CameraProbe(Arc<ProbeState>);

impl CameraProbe {
    /// Frames read out so far (spectral and image).
    pub fn frame_count(&self) -> u64 {
        self.0.frames.load(Ordering::SeqCst)
    }

    /// Modes most recently issued to the camera.
    pub fn settings(&self) -> AcquisitionSettings {
        *self.0.settings.lock()
    }

    /// Mode-setter calls that succeeded.
    pub fn configure_calls(&self) -> u64 {
        self.0.configure_calls.load(Ordering::SeqCst)
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

/// Builder for [`MockCamera`].
pub struct MockCameraBuilder {
    geometry: DetectorGeometry,
    mode: MockMode,
    levels: SignalLevels,
    noise: f64,
    profiled: bool,
    timing: TimingConfig,
    error_config: ErrorConfig,
    seed: Option<u64>,
    shutters: Option<Arc<ShutterState>>,
}

impl MockCameraBuilder {
    /// Start from `geometry` with flat illumination, no noise and no delays.
    pub fn new(geometry: DetectorGeometry) -> Self {
        Self {
            geometry,
            mode: MockMode::Instant,
            levels: SignalLevels::default(),
            noise: 0.0,
            profiled: false,
            timing: TimingConfig::detector(),
            error_config: ErrorConfig::none(),
            seed: None,
            shutters: None,
        }
    }

    /// Sensor dimensions.
    pub fn geometry(mut self, geometry: DetectorGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Operational mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Counts per light path.
    pub fn levels(mut self, levels: SignalLevels) -> Self {
        self.levels = levels;
        self
    }

    /// Standard deviation of the read noise, in counts. Ignored in Instant mode.
    pub fn noise(mut self, sigma: f64) -> Self {
        self.noise = sigma.max(0.0);
        self
    }

    /// Shape lamp light with a lamp spectrum and slit image instead of flat illumination.
    pub fn profiled(mut self, profiled: bool) -> Self {
        self.profiled = profiled;
        self
    }

    /// Readout delays used in Realistic mode.
    pub fn timing_config(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Fault injection.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Seed for the noise generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Flag positions the camera sees through.
    pub fn shutters(mut self, shutters: Arc<ShutterState>) -> Self {
        self.shutters = Some(shutters);
        self
    }

    /// Build the camera.
    pub fn build(self) -> MockCamera {
        let (spectrum, slit) = if self.profiled {
            (
                Some(emission_profile(self.geometry.width)),
                Some(slit_profile(self.geometry.height)),
            )
        } else {
            (None, None)
        };

        MockCamera {
            geometry: self.geometry,
            mode: self.mode,
            levels: self.levels,
            noise: self.noise,
            spectrum,
            slit,
            timing: self.timing,
            error_config: self.error_config,
            rng: MockRng::new(self.seed),
            shutters: self.shutters.unwrap_or_default(),
            probe: CameraProbe(Arc::new(ProbeState {
                frames: AtomicU64::new(0),
                settings: Mutex::new(AcquisitionSettings::default()),
                configure_calls: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            })),
        }
    }
}

/// Simulated CCD detector.
///
/// Frames are synthesised from [`SignalLevels`] and the current flag positions in
/// the shared [`ShutterState`]. In Realistic mode `acquire` blocks the calling
/// thread for the configured readout time.
pub struct MockCamera {
    geometry: DetectorGeometry,
    mode: MockMode,
    levels: SignalLevels,
    noise: f64,
    spectrum: Option<Vec<f64>>,
    slit: Option<Vec<f64>>,
    timing: TimingConfig,
    error_config: ErrorConfig,
    rng: MockRng,
    shutters: Arc<ShutterState>,
    probe: CameraProbe,
}

impl MockCamera {
    /// Instant, noiseless camera with default signal levels.
    pub fn new(geometry: DetectorGeometry) -> Self {
        Self::builder().geometry(geometry).build()
    }

    /// Builder for a 1024 x 256 detector.
    pub fn builder() -> MockCameraBuilder {
        MockCameraBuilder::new(DetectorGeometry::default())
    }

    /// Handle for inspecting the camera after it has been boxed.
    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }

    fn render(&self, read_mode: ReadMode) -> Result<FrameBuffer, DriverError> {
        let (width, height) = self.geometry.shape(read_mode);
        let lamp = if self.shutters.lamp_open() {
            f64::from(self.levels.lamp)
        } else {
            0.0
        };
        let laser = if self.shutters.laser_open() {
            f64::from(self.levels.laser)
        } else {
            0.0
        };
        let dark = f64::from(self.levels.dark);
        let add_noise = self.mode.adds_noise();

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row_gain = match (read_mode, &self.slit) {
                (ReadMode::Image, Some(slit)) => slit[y],
                _ => 1.0,
            };
            for x in 0..width {
                let shape = self.spectrum.as_ref().map_or(1.0, |s| s[x]);
                let mut value = dark + (lamp * shape + laser) * row_gain;
                if add_noise {
                    value += self.rng.gaussian(self.noise);
                }
                data.push(value.round() as i32);
            }
        }

        match read_mode {
            ReadMode::Spectral => Ok(FrameBuffer::spectral(data)),
            ReadMode::Image => FrameBuffer::image(data, width, height).map_err(|e| {
                DriverError::new(DRIVER_TYPE, DriverErrorKind::InvalidData, e.to_string())
            }),
        }
    }

    fn read_out(&self, read_mode: ReadMode) -> Result<FrameBuffer, DriverError> {
        if self.mode.simulates_timing() {
            std::thread::sleep(self.timing.readout(read_mode));
        }
        let frame = self.render(read_mode)?;
        let n = self.probe.0.frames.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            frame = n,
            read_mode = %read_mode,
            laser = self.shutters.laser_open(),
            lamp = self.shutters.lamp_open(),
            "Mock readout"
        );
        Ok(frame)
    }

    fn update_settings(
        &self,
        apply: impl FnOnce(&mut AcquisitionSettings),
    ) -> Result<(), DriverError> {
        self.error_config.check_operation(DRIVER_TYPE, OP_CONFIGURE)?;
        let mut settings = self.probe.0.settings.lock();
        apply(&mut settings);
        drop(settings);
        self.probe.0.configure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CameraDriver for MockCamera {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn geometry(&self) -> DetectorGeometry {
        self.geometry
    }

    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), DriverError> {
        self.update_settings(|s| s.acquisition_mode = mode)
    }

    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError> {
        self.update_settings(|s| s.trigger_mode = mode)
    }

    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), DriverError> {
        self.update_settings(|s| s.read_mode = mode)
    }

    fn read_mode(&self) -> ReadMode {
        self.probe.settings().read_mode
    }

    fn acquire(&mut self) -> Result<FrameBuffer, DriverError> {
        self.error_config.check_operation(DRIVER_TYPE, OP_ACQUIRE)?;
        self.read_out(self.read_mode())
    }

    fn full_resolution_image(&mut self) -> Result<FrameBuffer, DriverError> {
        self.error_config.check_operation(DRIVER_TYPE, OP_IMAGE)?;
        self.read_out(ReadMode::Image)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.probe.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
