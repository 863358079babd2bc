//! Explicit driver construction.
//!
//! The instrument's hardware is chosen by a [`DriverKind`] read from configuration;
//! [`build_commander`] matches on it and wires the concrete camera and beam flags
//! together.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use crate::mock_beam_flags::{MockBeamFlags, ShutterState};
use crate::mock_camera::{MockCamera, SignalLevels};
use optodaq_core::{AppResult, Commander, DaqError, DetectorGeometry};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which hardware backend drives the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Simulated detector and beam flags
    #[default]
    Mock,
}

/// Configuration for the simulated detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockDetectorConfig {
    /// Columns (default: 1024)
    pub width: usize,
    /// Rows (default: 256)
    pub height: usize,
    /// Operational mode (default: realistic)
    pub mode: MockMode,
    /// Spectral readout time in milliseconds; image readout takes 8x longer
    pub readout_ms: u64,
    /// Dark offset in counts
    pub dark_level: i32,
    /// Peak lamp counts
    pub lamp_level: i32,
    /// Scattered laser counts
    pub laser_level: i32,
    /// Read noise standard deviation in counts
    pub noise: f64,
    /// Seed for noise and failure decisions; random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Probability that any driver call fails (0.0 to 1.0)
    pub failure_rate: f64,
    /// Shape lamp light with a spectrum and slit image
    pub profiled: bool,
}

impl Default for MockDetectorConfig {
    fn default() -> Self {
        let levels = SignalLevels::default();
        Self {
            width: optodaq_core::frame::DEFAULT_WIDTH,
            height: optodaq_core::frame::DEFAULT_HEIGHT,
            mode: MockMode::Realistic,
            readout_ms: 20,
            dark_level: levels.dark,
            lamp_level: levels.lamp,
            laser_level: levels.laser,
            noise: 4.0,
            seed: None,
            failure_rate: 0.0,
            profiled: true,
        }
    }
}

impl MockDetectorConfig {
    /// Sensor dimensions.
    pub fn geometry(&self) -> DetectorGeometry {
        DetectorGeometry::new(self.width, self.height)
    }

    /// Counts per light path.
    pub fn levels(&self) -> SignalLevels {
        SignalLevels {
            dark: self.dark_level,
            lamp: self.lamp_level,
            laser: self.laser_level,
        }
    }

    /// Reject values the simulator cannot honour.
    pub fn validate(&self) -> AppResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DaqError::Configuration(
                "detector resolution must be non-zero".into(),
            ));
        }
        if !self.noise.is_finite() || self.noise < 0.0 {
            return Err(DaqError::Configuration(format!(
                "detector noise must be a non-negative number, got {}",
                self.noise
            )));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(DaqError::Configuration(format!(
                "detector failure_rate must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

/// Construct the [`Commander`] for `kind`.
pub fn build_commander(kind: DriverKind, config: &MockDetectorConfig) -> AppResult<Commander> {
    config.validate()?;
    match kind {
        DriverKind::Mock => {
            let errors = if config.failure_rate > 0.0 {
                ErrorConfig::random_failures_seeded(config.failure_rate, config.seed)
            } else {
                ErrorConfig::none()
            };
            let timing = TimingConfig::from_readout_ms(config.readout_ms);
            let shutters = ShutterState::new();

            let mut camera = MockCamera::builder()
                .geometry(config.geometry())
                .mode(config.mode)
                .levels(config.levels())
                .noise(config.noise)
                .profiled(config.profiled)
                .timing_config(timing)
                .error_config(errors.clone())
                .shutters(shutters.clone());
            if let Some(seed) = config.seed {
                camera = camera.seed(seed);
            }
            let flags = MockBeamFlags::new(shutters)
                .with_mode(config.mode, timing)
                .with_error_config(errors);

            info!(
                width = config.width,
                height = config.height,
                mode = ?config.mode,
                failure_rate = config.failure_rate,
                "Built mock detector"
            );
            Ok(Commander::new(Box::new(camera.build()), Box::new(flags)))
        }
    }
}
