//! Device driver boundary.
//!
//! Unlike the capability traits of a free-running streaming stack, everything here is
//! blocking: a detector SDK call returns when the readout is complete or the device
//! faults. Callers are expected to run these on a thread they are prepared to block.
//!
//! # Layers
//!
//! - [`CameraDriver`]: mode configuration and raw readout for one detector
//! - [`BeamFlags`]: laser and lamp shutters in front of the sample
//! - [`FrameSource`]: the composite capture primitives an acquisition run needs;
//!   implemented by [`Commander`](crate::Commander)
//!
//! # Timeouts
//!
//! No call here has a timeout. A driver that never returns blocks its caller
//! indefinitely; drivers that can detect a stalled readout should report
//! [`DriverErrorKind::Timeout`](crate::DriverErrorKind::Timeout) themselves.

use crate::error::DriverError;
use crate::frame::{CaptureKind, DetectorGeometry, FrameBuffer};
use crate::modes::{AcquisitionMode, AcquisitionSettings, ReadMode, TriggerMode};

/// Blocking detector driver.
///
/// # Contract
/// - Mode setters are idempotent and must be issued before the first capture
/// - `acquire()` returns a buffer shaped for the active read mode
/// - `full_resolution_image()` always returns `width * height` elements
pub trait CameraDriver: Send {
    /// Short identifier used in errors and logs.
    fn driver_type(&self) -> &'static str;

    /// Sensor dimensions.
    fn geometry(&self) -> DetectorGeometry;

    /// Select the acquisition mode.
    fn set_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), DriverError>;

    /// Select the trigger mode.
    fn set_trigger_mode(&mut self, mode: TriggerMode) -> Result<(), DriverError>;

    /// Select the read mode.
    fn set_read_mode(&mut self, mode: ReadMode) -> Result<(), DriverError>;

    /// Currently selected read mode.
    fn read_mode(&self) -> ReadMode;

    /// Expose and read out one frame in the active read mode.
    fn acquire(&mut self) -> Result<FrameBuffer, DriverError>;

    /// Expose and read out the full sensor, regardless of read mode.
    fn full_resolution_image(&mut self) -> Result<FrameBuffer, DriverError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Blocking laser and lamp shutter control.
///
/// # Safety
/// Opening the laser flag exposes the sample (and anything else in the path) to the
/// excitation beam. Hardware interlocks remain the primary protection.
pub trait BeamFlags: Send {
    /// Let the excitation laser through.
    fn open_laser(&mut self) -> Result<(), DriverError>;

    /// Block the excitation laser.
    fn close_laser(&mut self) -> Result<(), DriverError>;

    /// Let the probe lamp through.
    fn open_lamp(&mut self) -> Result<(), DriverError>;

    /// Block the probe lamp.
    fn close_lamp(&mut self) -> Result<(), DriverError>;
}

/// Capture primitives consumed by acquisition runs.
///
/// Every method blocks until the driver returns. Any error is fatal to the run
/// that issued it.
pub trait FrameSource: Send + Sync {
    /// Issue acquisition, trigger and read mode to the detector.
    fn configure(&self, settings: &AcquisitionSettings) -> Result<(), DriverError>;

    /// Detector geometry.
    fn geometry(&self) -> DetectorGeometry;

    /// Unexposed readout in the configured read mode.
    fn capture_dark(&self) -> Result<FrameBuffer, DriverError>;

    /// Single lamp exposure.
    fn capture_flash(&self) -> Result<FrameBuffer, DriverError>;

    /// Single exposure with the sample excited.
    fn capture_trans(&self) -> Result<FrameBuffer, DriverError>;

    /// Full-resolution image exposure.
    fn capture_image(&self) -> Result<FrameBuffer, DriverError>;

    /// Dispatch on a [`CaptureKind`].
    fn capture(&self, kind: CaptureKind) -> Result<FrameBuffer, DriverError> {
        match kind {
            CaptureKind::Dark => self.capture_dark(),
            CaptureKind::Flash => self.capture_flash(),
            CaptureKind::Trans => self.capture_trans(),
            CaptureKind::Image => self.capture_image(),
        }
    }

    /// Close shutters and release the hardware.
    fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
