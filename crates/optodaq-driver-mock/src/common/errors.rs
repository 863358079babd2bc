//! Error injection framework for simulated hardware.
//!
//! Every simulated driver call names an operation (`acquire`, `image`,
//! `configure`, `shutter`) and asks its [`ErrorConfig`] whether that call should
//! fail. Clones share state, so one config handed to both the camera and the beam
//! flags counts operations across the whole instrument.

use super::rng::MockRng;
use optodaq_core::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Readout in the active read mode.
pub const OP_ACQUIRE: &str = "acquire";
/// Full-resolution image readout.
pub const OP_IMAGE: &str = "image";
/// Acquisition, trigger or read mode change.
pub const OP_CONFIGURE: &str = "configure";
/// Beam flag movement.
pub const OP_SHUTTER: &str = "shutter";

/// Error injection configuration.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0); `"*"` applies to every operation
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

/// A deterministic failure pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorScenario {
    /// The first `count` calls of `operation` succeed, every later one fails
    FailAfterN {
        /// Operation name
        operation: &'static str,
        /// Successful calls before the first failure
        count: u32,
    },
    /// Every call of `operation` times out
    Timeout {
        /// Operation name
        operation: &'static str,
    },
    /// The link drops on the first call and never comes back
    CommunicationLoss,
    /// The device latches a fault code on the first call
    HardwareFault {
        /// Vendor fault code
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    communication_lost: bool,
    hardware_fault_code: Option<u32>,
}

impl ErrorConfig {
    /// No injected errors.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation, reproducible with `seed`.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate.clamp(0.0, 1.0));
        Self::build(rates, Vec::new(), seed)
    }

    /// A single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rates per operation.
    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        failure_rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(failure_rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Decide whether this call of `operation` fails.
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }
        if let Some(code) = state.hardware_fault_code {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", code),
            ));
        }

        let calls = {
            let count = state.operation_counts.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation && calls > *count => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected '{}' failure after {} calls", operation, count),
                    ));
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = Some(*code);
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {}", code),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Number of times `operation` has been checked since the last reset.
    pub fn calls(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .operation_counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Clear counters and latched faults.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
