//! Simulated hardware for optodaq.
//!
//! Provides a detector and a beam-flag unit that behave like the real thing
//! without any hardware attached. All calls block the calling thread, like a vendor
//! SDK would; Realistic mode uses `std::thread::sleep` for readout and shutter
//! delays.
//!
//! # Available Mock Drivers
//!
//! - [`MockCamera`] - CCD detector with spectral (FVB) and image readout
//! - [`MockBeamFlags`] - laser and lamp flags sharing a [`ShutterState`] with the camera
//!
//! # Signal Model
//!
//! Each element reads `dark + lamp * spectrum[x] * slit[y] + laser * slit[y]`
//! (plus read noise outside Instant mode), where the lamp and laser terms only
//! contribute while their flag is open. With profiling disabled the spectrum and
//! slit are flat, which makes frames exact and easy to assert on.
//!
//! # Driver Factory
//!
//! ```rust
//! use optodaq_driver_mock::{build_commander, DriverKind, MockDetectorConfig};
//! use optodaq_core::FrameSource;
//!
//! let config = MockDetectorConfig { mode: optodaq_driver_mock::MockMode::Instant, ..Default::default() };
//! let commander = build_commander(DriverKind::Mock, &config)?;
//! let dark = commander.capture_dark()?;
//! assert_eq!(dark.len(), 1024);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod common;
mod factory;
mod mock_beam_flags;
mod mock_camera;
pub mod pattern;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};
pub use common::{OP_ACQUIRE, OP_CONFIGURE, OP_IMAGE, OP_SHUTTER};

pub use factory::{build_commander, DriverKind, MockDetectorConfig};
pub use mock_beam_flags::{MockBeamFlags, ShutterState};
pub use mock_camera::{CameraProbe, MockCamera, MockCameraBuilder, SignalLevels};
