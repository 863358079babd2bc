//! Timing configuration for realistic mode.

use optodaq_core::ReadMode;
use std::time::Duration;

/// Blocking delays applied by simulated hardware in [`MockMode::Realistic`](super::MockMode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Exposure plus readout of a binned spectral trace, in milliseconds
    pub spectral_readout_ms: u64,
    /// Exposure plus readout of a full image, in milliseconds
    pub image_readout_ms: u64,
    /// Mechanical settling of a beam flag, in milliseconds
    pub shutter_ms: u64,
}

impl TimingConfig {
    /// Typical CCD spectrometer: fast binned readout, slow full-frame readout.
    pub fn detector() -> Self {
        Self::from_readout_ms(20)
    }

    /// Derive a config from the spectral readout time; full frames take 8x longer.
    pub fn from_readout_ms(spectral_readout_ms: u64) -> Self {
        Self {
            spectral_readout_ms,
            image_readout_ms: spectral_readout_ms * 8,
            shutter_ms: 5,
        }
    }

    /// Readout delay for `read_mode`.
    pub fn readout(&self, read_mode: ReadMode) -> Duration {
        match read_mode {
            ReadMode::Spectral => Duration::from_millis(self.spectral_readout_ms),
            ReadMode::Image => Duration::from_millis(self.image_readout_ms),
        }
    }

    /// Beam flag settling delay.
    pub fn shutter(&self) -> Duration {
        Duration::from_millis(self.shutter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.readout(ReadMode::Image), Duration::ZERO);
        assert_eq!(config.shutter(), Duration::ZERO);
    }

    #[test]
    fn test_image_readout_slower() {
        let config = TimingConfig::detector();
        assert_eq!(config.readout(ReadMode::Spectral), Duration::from_millis(20));
        assert_eq!(config.readout(ReadMode::Image), Duration::from_millis(160));
    }
}
