//! Enumerated detector settings.
//!
//! Each mode maps onto the integer constant the detector SDK expects, so drivers
//! talking to real hardware can forward [`ReadMode::raw`] and friends unchanged.

use serde::{Deserialize, Serialize};

/// How the sensor is read out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Full vertical binning: one 1-D intensity trace.
    #[default]
    #[serde(alias = "fvb")]
    Spectral,
    /// Full 2-D frame.
    Image,
}

impl ReadMode {
    /// SDK constant.
    pub fn raw(self) -> i32 {
        match self {
            ReadMode::Spectral => 0,
            ReadMode::Image => 4,
        }
    }

    /// Parse an SDK constant.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ReadMode::Spectral),
            4 => Some(ReadMode::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::Spectral => write!(f, "spectral"),
            ReadMode::Image => write!(f, "image"),
        }
    }
}

/// Acquisition sequencing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// One exposure per acquire call.
    #[default]
    Single,
    /// Several exposures summed on-chip.
    Accumulate,
    /// Series of exposures.
    Kinetics,
    /// Sub-frame kinetic series.
    FastKinetics,
    /// Free-running until aborted.
    RunTillAbort,
}

impl AcquisitionMode {
    /// SDK constant.
    pub fn raw(self) -> i32 {
        match self {
            AcquisitionMode::Single => 1,
            AcquisitionMode::Accumulate => 2,
            AcquisitionMode::Kinetics => 3,
            AcquisitionMode::FastKinetics => 4,
            AcquisitionMode::RunTillAbort => 5,
        }
    }
}

/// Exposure trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Detector triggers itself.
    Internal,
    /// External edge starts each exposure.
    External,
    /// External edge starts the series.
    ExternalStart,
    /// External pulse width sets the exposure.
    #[default]
    ExternalExposure,
}

impl TriggerMode {
    /// SDK constant.
    pub fn raw(self) -> i32 {
        match self {
            TriggerMode::Internal => 0,
            TriggerMode::External => 1,
            TriggerMode::ExternalStart => 6,
            TriggerMode::ExternalExposure => 7,
        }
    }
}

/// The three mode settings issued to the detector before any capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Sequencing mode.
    pub acquisition_mode: AcquisitionMode,
    /// Trigger source.
    pub trigger_mode: TriggerMode,
    /// Readout mode.
    pub read_mode: ReadMode,
}

impl AcquisitionSettings {
    /// Single external-exposure readout in `read_mode`; what manual reference captures use.
    pub fn single(read_mode: ReadMode) -> Self {
        Self {
            acquisition_mode: AcquisitionMode::Single,
            trigger_mode: TriggerMode::ExternalExposure,
            read_mode,
        }
    }
}
