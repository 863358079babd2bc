//! Layered configuration using Figment.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file: the `--config` path, or `config/optodaq.toml` when it exists
//! 3. Environment variables prefixed with `OPTODAQ_`, nested keys split on `__`
//!
//! ```toml
//! log_level = "debug"
//! log_format = "compact"
//!
//! [instrument]
//! id = "lui"
//! driver = "mock"
//!
//! [detector]
//! width = 1024
//! height = 256
//! mode = "realistic"
//!
//! [run]
//! n_steps = 9
//! read_mode = "fvb"
//! excite = true
//! ```
//!
//! `OPTODAQ_RUN__N_STEPS=20` overrides `run.n_steps`.

use crate::telemetry::{parse_log_level, OutputFormat};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use optodaq_core::{AppResult, DaqError};
use optodaq_driver_mock::{DriverKind, MockDetectorConfig};
use optodaq_experiment::RunParameters;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File merged when no `--config` is given, if present.
pub const DEFAULT_CONFIG_PATH: &str = "config/optodaq.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "OPTODAQ_";

/// Effective application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// trace, debug, info, warn or error
    pub log_level: String,
    pub log_format: OutputFormat,
    pub instrument: InstrumentSettings,
    /// Simulated detector; read when `instrument.driver` is `mock`
    pub detector: MockDetectorConfig,
    /// Defaults for `optodaq run`
    pub run: RunParameters,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
            instrument: InstrumentSettings::default(),
            detector: MockDetectorConfig::default(),
            run: RunParameters::default(),
        }
    }
}

/// Which instrument to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Arbitration key; tasks on the same id exclude each other
    pub id: String,
    pub driver: DriverKind,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            id: "lui".to_string(),
            driver: DriverKind::Mock,
        }
    }
}

impl Settings {
    /// Merge every source and validate the result.
    ///
    /// An explicit `path` must exist; the default path is skipped when absent.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        match path {
            Some(path) if !path.exists() => {
                return Err(DaqError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => figment = figment.merge(Toml::file(path)),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_PATH));
            }
            None => {}
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> AppResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> AppResult<()> {
        parse_log_level(&self.log_level)?;
        if self.instrument.id.trim().is_empty() {
            return Err(DaqError::Configuration(
                "instrument.id must not be empty".into(),
            ));
        }
        self.detector.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optodaq_core::ReadMode;
    use optodaq_driver_mock::MockMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn from_toml(contents: &str) -> AppResult<Settings> {
        Settings::extract(
            Figment::from(Serialized::defaults(Settings::default()))
                .merge(Toml::string(contents)),
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.instrument.id, "lui");
        assert_eq!(settings.run.n_steps, 0);
        assert_eq!(settings.detector.mode, MockMode::Realistic);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file(
            r#"
            log_level = "debug"
            log_format = "json"

            [instrument]
            id = "bench"

            [detector]
            width = 64
            height = 8
            mode = "instant"

            [run]
            n_steps = 9
            read_mode = "fvb"
            excite = true
            "#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.log_format, OutputFormat::Json);
        assert_eq!(settings.instrument.id, "bench");
        assert_eq!(settings.instrument.driver, DriverKind::Mock);
        assert_eq!(settings.detector.width, 64);
        assert_eq!(settings.detector.mode, MockMode::Instant);
        // untouched keys keep their defaults
        assert_eq!(settings.detector.readout_ms, 20);
        assert_eq!(settings.run.n_steps, 9);
        assert_eq!(settings.run.read_mode, ReadMode::Spectral);
        assert!(settings.run.excite);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load(Some(&missing)),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            from_toml("log_level = \"loud\""),
            Err(DaqError::Configuration(_))
        ));
        assert!(matches!(
            from_toml("[instrument]\nid = \"  \""),
            Err(DaqError::Configuration(_))
        ));
        assert!(matches!(
            from_toml("[detector]\nfailure_rate = 2.0"),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_malformed_values_fail_to_load() {
        assert!(matches!(
            from_toml("[run]\nread_mode = \"hologram\""),
            Err(DaqError::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_settings_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Settings::default()).unwrap();
        assert_eq!(from_toml(&text).unwrap(), Settings::default());
    }
}
