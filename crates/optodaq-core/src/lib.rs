//! `optodaq-core`
//!
//! Core types and traits shared by the optodaq acquisition stack.
//!
//! The crate is deliberately synchronous: detector drivers are blocking, and the
//! orchestration layer (`optodaq-experiment`) decides which thread they block.
//!
//! ## Key Types
//!
//! - [`FrameBuffer`]: one detector readout as a flat, row-major buffer of `i32` counts
//! - [`ReadMode`], [`AcquisitionMode`], [`TriggerMode`]: enumerated driver settings
//! - [`correction`]: dark subtraction and blank normalization
//! - [`FrameSource`]: the capture contract consumed by acquisition runs
//! - [`Commander`]: facade combining a [`CameraDriver`] with [`BeamFlags`]
//! - [`DaqError`]: the error taxonomy for the whole workspace
//!
//! ## Example
//!
//! ```rust
//! use optodaq_core::{correction, FrameBuffer};
//!
//! let mut frame = FrameBuffer::spectral(vec![10, 10, 10]);
//! let dark = FrameBuffer::spectral(vec![2, 2, 2]);
//! let blank = FrameBuffer::spectral(vec![20, 20, 20]);
//!
//! correction::correct(&mut frame, Some(&dark), Some(&blank))?;
//! assert_eq!(frame.as_slice(), &[12, 12, 12]);
//! # Ok::<(), optodaq_core::DaqError>(())
//! ```

pub mod commander;
pub mod correction;
pub mod driver;
pub mod error;
pub mod frame;
pub mod modes;

pub use commander::Commander;
pub use driver::{BeamFlags, CameraDriver, FrameSource};
pub use error::{AppResult, DaqError, DriverError, DriverErrorKind, ReferenceKind};
pub use frame::{CaptureKind, DetectorGeometry, FrameBuffer, FrameStats, StepTag};
pub use modes::{AcquisitionMode, AcquisitionSettings, ReadMode, TriggerMode};
