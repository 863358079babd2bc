//! Error types for the acquisition stack.
//!
//! This module defines the primary error type, `DaqError`, shared by every crate in
//! the workspace. Using the `thiserror` crate it gives a single, consistent way to
//! report what went wrong during an acquisition run, from a malformed reference
//! buffer to a detector that stopped answering.
//!
//! ## Error Hierarchy
//!
//! - **`ShapeMismatch`**: a dark or blank reference does not have the same element
//!   count as the frame it is applied to. Programmer or configuration error; never
//!   tolerated by truncation.
//! - **`Device`**: a capture or mode-configuration call into the detector driver
//!   failed. Always fatal for the current run, never retried automatically.
//! - **`InstrumentBusy`**: another task owns the instrument; the request was rejected
//!   without touching the hardware.
//! - **`Declined`**: the operator answered "cancel" at a confirmation prompt.
//! - **`Configuration`** / **`ConfigLoad`** / **`Io`**: ambient failures while loading
//!   or validating settings.
//!
//! Cancellation of a running acquisition is *not* an error and has no variant here;
//! it is a terminal run state.

use crate::frame::{CaptureKind, StepTag};
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Driver could not be opened or initialised.
    Initialization,
    /// A mode or parameter was rejected by the driver.
    Configuration,
    /// Link to the device was lost.
    Communication,
    /// Driver failed while closing.
    Shutdown,
    /// Device reported a fault.
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Device returned data the driver could not interpret.
    InvalidData,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidData => "invalid_data",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure raised by a device driver call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Short identifier of the driver that failed (e.g. `mock_camera`).
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Application Errors
// =============================================================================

/// Which reference buffer a correction was using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Unexposed baseline.
    Dark,
    /// Baseline through the optical path without sample.
    Blank,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Dark => write!(f, "dark"),
            ReferenceKind::Blank => write!(f, "blank"),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the acquisition stack.
///
/// # Error Categories
///
/// 1. **Run-fatal errors** - `ShapeMismatch`, `Device`
///    - Abort the current acquisition run and surface as its `Failed` state
///    - Recovery: the operator starts a fresh run; nothing is retried automatically
///
/// 2. **Admission errors** - `InstrumentBusy`, `Declined`
///    - Returned from start requests before any capture happens
///    - Recovery: wait for the owning task to finish, or ask the operator again
///
/// 3. **Configuration errors** - `Configuration`, `ConfigLoad`, `Io`
///    - Occur at startup
///    - Recovery: fix the settings file or environment and restart
#[derive(Error, Debug)]
pub enum DaqError {
    /// A reference buffer and a frame have different element counts.
    ///
    /// Occurs when the read mode changed between capturing a reference and capturing
    /// sample frames (a spectral blank applied to an image frame, for instance), or
    /// when a driver returned a truncated buffer.
    ///
    /// **Error Type**: Permanent for the run - the reference must be recaptured.
    ///
    /// # Example
    ///
    /// ```rust
    /// use optodaq_core::{correction, DaqError, FrameBuffer};
    ///
    /// let mut frame = FrameBuffer::spectral(vec![1, 2, 3]);
    /// let dark = FrameBuffer::spectral(vec![1, 2]);
    /// let err = correction::apply_dark(&mut frame, Some(&dark)).unwrap_err();
    /// assert!(matches!(err, DaqError::ShapeMismatch { .. }));
    /// ```
    #[error("{reference} reference has {actual} elements but frame has {expected}")]
    ShapeMismatch {
        /// Which reference was being applied.
        reference: ReferenceKind,
        /// Element count of the frame.
        expected: usize,
        /// Element count of the reference.
        actual: usize,
    },

    /// A capture or configuration call into the detector failed.
    ///
    /// **Error Type**: Environmental. Fatal for the current run.
    ///
    /// **Recovery Strategy**: Check cabling and power, then start a new run.
    #[error("{capture} capture failed{}: {source}", describe_step(.step))]
    Device {
        /// Which capture primitive was executing.
        capture: CaptureKind,
        /// Position within the run, when the failure happened inside one.
        step: Option<StepTag>,
        /// Underlying driver failure.
        #[source]
        source: DriverError,
    },

    /// Mode configuration failed before any capture.
    #[error("Detector configuration failed: {0}")]
    Setup(#[source] DriverError),

    /// Another task currently owns the instrument.
    ///
    /// **Error Type**: Transient - resolves when the owning task terminates.
    ///
    /// **Recovery Strategy**: Wait for the owner to finish; requests are never queued.
    #[error("Instrument is busy ({owner} in progress)")]
    InstrumentBusy {
        /// Display name of the owning task category.
        owner: String,
    },

    /// Operator cancelled at a confirmation prompt.
    #[error("Operator declined the '{prompt}' prompt")]
    Declined {
        /// Title of the declined prompt.
        prompt: String,
    },

    /// Configuration values parsed correctly but failed semantic validation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use optodaq_core::DaqError;
    ///
    /// fn validate_width(width: usize) -> Result<(), DaqError> {
    ///     if width == 0 {
    ///         return Err(DaqError::Configuration("detector width must be non-zero".into()));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration sources could not be parsed or merged.
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Wrap a driver failure with the capture that raised it.
    pub fn device(capture: CaptureKind, step: Option<StepTag>, source: DriverError) -> Self {
        DaqError::Device {
            capture,
            step,
            source,
        }
    }

    /// Capture primitive associated with this error, if any.
    pub fn capture(&self) -> Option<CaptureKind> {
        match self {
            DaqError::Device { capture, .. } => Some(*capture),
            _ => None,
        }
    }

    /// Run position associated with this error, if any.
    pub fn step(&self) -> Option<StepTag> {
        match self {
            DaqError::Device { step, .. } => *step,
            _ => None,
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::ConfigLoad(Box::new(err))
    }
}

fn describe_step(step: &Option<StepTag>) -> String {
    match step {
        Some(step) => format!(" at {}", step),
        None => String::new(),
    }
}
