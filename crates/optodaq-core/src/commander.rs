//! `Commander`: one detector plus its beam flags behind a single lock.
//!
//! The composite primitives sequence shutter moves around a readout:
//!
//! | Primitive | Laser | Lamp | Readout |
//! |-----------|-------|------|---------|
//! | `dark`    | closed | closed | `acquire` |
//! | `flash`   | closed | open   | `acquire` |
//! | `trans`   | open   | open   | `acquire` |
//! | `image`   | as-is  | as-is  | `full_resolution_image` |
//!
//! Flags opened for a primitive are closed again even when the readout fails.

use crate::driver::{BeamFlags, CameraDriver, FrameSource};
use crate::error::DriverError;
use crate::frame::{DetectorGeometry, FrameBuffer};
use crate::modes::AcquisitionSettings;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

struct Hardware {
    camera: Box<dyn CameraDriver>,
    flags: Box<dyn BeamFlags>,
}

/// Facade over a detector and its beam flags.
pub struct Commander {
    hardware: Mutex<Hardware>,
    geometry: DetectorGeometry,
}

impl Commander {
    /// Wrap a camera and beam-flag unit.
    pub fn new(camera: Box<dyn CameraDriver>, flags: Box<dyn BeamFlags>) -> Self {
        let geometry = camera.geometry();
        Self {
            hardware: Mutex::new(Hardware { camera, flags }),
            geometry,
        }
    }

    /// Close both flags and read out one frame.
    pub fn dark(&self) -> Result<FrameBuffer, DriverError> {
        let mut hw = self.hardware.lock();
        hw.flags.close_laser()?;
        hw.flags.close_lamp()?;
        hw.camera.acquire()
    }

    /// Read out one frame with only the lamp open.
    pub fn flash(&self) -> Result<FrameBuffer, DriverError> {
        let mut hw = self.hardware.lock();
        hw.flags.close_laser()?;
        hw.flags.open_lamp()?;
        let frame = hw.camera.acquire();
        let closed = hw.flags.close_lamp();
        finish(frame, closed)
    }

    /// Read out one frame with laser and lamp open.
    pub fn trans(&self) -> Result<FrameBuffer, DriverError> {
        let mut hw = self.hardware.lock();
        hw.flags.open_laser()?;
        if let Err(e) = hw.flags.open_lamp() {
            let _ = hw.flags.close_laser();
            return Err(e);
        }
        let frame = hw.camera.acquire();
        let lamp = hw.flags.close_lamp();
        let laser = hw.flags.close_laser();
        finish(finish(frame, lamp), laser)
    }

    /// Full-resolution image with the flags left as they are.
    pub fn image(&self) -> Result<FrameBuffer, DriverError> {
        self.hardware.lock().camera.full_resolution_image()
    }
}

/// Prefer the readout error; otherwise report a failed shutter close.
fn finish(
    frame: Result<FrameBuffer, DriverError>,
    closed: Result<(), DriverError>,
) -> Result<FrameBuffer, DriverError> {
    match (frame, closed) {
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close beam flag after failed readout");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Ok(frame), Ok(())) => Ok(frame),
    }
}

impl FrameSource for Commander {
    fn configure(&self, settings: &AcquisitionSettings) -> Result<(), DriverError> {
        let mut hw = self.hardware.lock();
        hw.camera.set_acquisition_mode(settings.acquisition_mode)?;
        hw.camera.set_trigger_mode(settings.trigger_mode)?;
        hw.camera.set_read_mode(settings.read_mode)?;
        debug!(
            acquisition_mode = settings.acquisition_mode.raw(),
            trigger_mode = settings.trigger_mode.raw(),
            read_mode = settings.read_mode.raw(),
            "Detector configured"
        );
        Ok(())
    }

    fn geometry(&self) -> DetectorGeometry {
        self.geometry
    }

    fn capture_dark(&self) -> Result<FrameBuffer, DriverError> {
        self.dark()
    }

    fn capture_flash(&self) -> Result<FrameBuffer, DriverError> {
        self.flash()
    }

    fn capture_trans(&self) -> Result<FrameBuffer, DriverError> {
        self.trans()
    }

    fn capture_image(&self) -> Result<FrameBuffer, DriverError> {
        self.image()
    }

    fn shutdown(&self) -> Result<(), DriverError> {
        let mut hw = self.hardware.lock();
        let laser = hw.flags.close_laser();
        let lamp = hw.flags.close_lamp();
        let camera = hw.camera.close();
        info!(driver = hw.camera.driver_type(), "Commander shut down");
        laser.and(lamp).and(camera)
    }
}
