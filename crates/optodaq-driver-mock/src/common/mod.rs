//! Common infrastructure for simulated hardware.
//!
//! - **mode**: Operational modes (Instant, Realistic, Chaos)
//! - **timing**: Readout and shutter delays
//! - **errors**: Error injection framework
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario, OP_ACQUIRE, OP_CONFIGURE, OP_IMAGE, OP_SHUTTER};
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::TimingConfig;
