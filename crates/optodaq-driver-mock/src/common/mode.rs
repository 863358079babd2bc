//! Operational modes for simulated hardware.
//!
//! - **Instant**: no delays, no noise; frames are exact functions of the signal levels
//! - **Realistic**: readout and shutter delays plus Gaussian read noise
//! - **Chaos**: noise without delays, intended to be paired with random failures

use serde::{Deserialize, Serialize};

/// Operational mode of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing - for integration tests and demos
    Realistic,
    /// Noisy and failure-prone - for resilience testing
    Chaos,
}

impl MockMode {
    /// Whether blocking delays are simulated.
    pub fn simulates_timing(self) -> bool {
        matches!(self, MockMode::Realistic)
    }

    /// Whether read noise is added to frames.
    pub fn adds_noise(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}
