//! Acquisition orchestration for optodaq.
//!
//! - [`run`]: the cancellable run state machine and its handle
//! - [`progress`]: publish-then-notify hand-off of corrected frames
//! - [`arbitration`]: one owner per instrument
//! - [`prompt`]: the operator confirmation contract
//! - [`AcquisitionController`]: per-instrument facade tying them together
//!
//! # Example
//!
//! ```rust,no_run
//! use optodaq_driver_mock::{build_commander, DriverKind, MockDetectorConfig};
//! use optodaq_experiment::{AcquisitionController, RunParameters, TaskArbiter};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), optodaq_core::DaqError> {
//! let commander = build_commander(DriverKind::Mock, &MockDetectorConfig::default())?;
//! let controller = AcquisitionController::new(Arc::new(commander), TaskArbiter::new("lui"));
//!
//! let (run, mut progress) = controller.start(RunParameters::new(9))?;
//! while let Some(note) = progress.blocking_recv() {
//!     if let Some(frame) = progress.frame(&note) {
//!         println!("{}: mean {:.1}", note.step, frame.buffer.stats().mean);
//!     }
//! }
//! println!("{}", run.state());
//! # Ok(())
//! # }
//! ```

pub mod arbitration;
mod controller;
pub mod progress;
pub mod prompt;
pub mod run;

pub use arbitration::{OwnerRegistry, TaskArbiter, TaskKind, TaskLease};
pub use controller::AcquisitionController;
pub use progress::{Progress, ProgressReceiver, PublishedFrame};
pub use prompt::{AutoConfirm, OperatorPrompt, PromptKind, PromptResponse};
pub use run::{
    AcquisitionRun, CancelToken, FailureKind, RunFailure, RunHandle, RunId, RunParameters,
    RunState, RunSummary,
};
