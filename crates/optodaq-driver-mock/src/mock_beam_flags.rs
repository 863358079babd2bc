//! Simulated laser and lamp beam flags.

use crate::common::{ErrorConfig, MockMode, TimingConfig, OP_SHUTTER};
use optodaq_core::{BeamFlags, DriverError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

const DRIVER_TYPE: &str = "mock_beam_flags";

/// Flag positions shared between [`MockBeamFlags`] and the camera that sees through them.
#[derive(Debug, Default)]
pub struct ShutterState {
    laser_open: AtomicBool,
    lamp_open: AtomicBool,
}

impl ShutterState {
    /// Both flags closed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Is the excitation laser reaching the sample?
    pub fn laser_open(&self) -> bool {
        self.laser_open.load(Ordering::SeqCst)
    }

    /// Is the probe lamp reaching the sample?
    pub fn lamp_open(&self) -> bool {
        self.lamp_open.load(Ordering::SeqCst)
    }
}

/// Simulated beam flag unit.
pub struct MockBeamFlags {
    state: Arc<ShutterState>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
}

impl MockBeamFlags {
    /// Flags driving `state`, instant and fault-free.
    pub fn new(state: Arc<ShutterState>) -> Self {
        Self {
            state,
            mode: MockMode::Instant,
            timing: TimingConfig::default(),
            error_config: ErrorConfig::none(),
        }
    }

    /// Set the operational mode and its delays.
    pub fn with_mode(mut self, mode: MockMode, timing: TimingConfig) -> Self {
        self.mode = mode;
        self.timing = timing;
        self
    }

    /// Inject errors on flag movements.
    pub fn with_error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// The shared flag positions.
    pub fn state(&self) -> Arc<ShutterState> {
        self.state.clone()
    }

    fn move_flag(&self, flag: &AtomicBool, open: bool, name: &str) -> Result<(), DriverError> {
        self.error_config.check_operation(DRIVER_TYPE, OP_SHUTTER)?;
        if flag.swap(open, Ordering::SeqCst) != open && self.mode.simulates_timing() {
            std::thread::sleep(self.timing.shutter());
        }
        trace!(flag = name, open, "Beam flag moved");
        Ok(())
    }
}

impl BeamFlags for MockBeamFlags {
    fn open_laser(&mut self) -> Result<(), DriverError> {
        self.move_flag(&self.state.laser_open, true, "laser")
    }

    fn close_laser(&mut self) -> Result<(), DriverError> {
        self.move_flag(&self.state.laser_open, false, "laser")
    }

    fn open_lamp(&mut self) -> Result<(), DriverError> {
        self.move_flag(&self.state.lamp_open, true, "lamp")
    }

    fn close_lamp(&mut self) -> Result<(), DriverError> {
        self.move_flag(&self.state.lamp_open, false, "lamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[test]
    fn test_flags_update_shared_state() {
        let state = ShutterState::new();
        let mut flags = MockBeamFlags::new(state.clone());
        assert!(!state.laser_open());
        assert!(!state.lamp_open());

        flags.open_lamp().unwrap();
        assert!(state.lamp_open());
        assert!(!state.laser_open());

        flags.open_laser().unwrap();
        flags.close_lamp().unwrap();
        assert!(state.laser_open());
        assert!(!state.lamp_open());
    }

    #[test]
    fn test_flag_fault_leaves_state_untouched() {
        let state = ShutterState::new();
        let mut flags = MockBeamFlags::new(state.clone())
            .with_error_config(ErrorConfig::scenario(ErrorScenario::Timeout {
                operation: OP_SHUTTER,
            }));
        assert!(flags.open_laser().is_err());
        assert!(!state.laser_open());
    }
}
