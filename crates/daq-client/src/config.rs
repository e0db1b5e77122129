//! Acquisition configuration using Figment
//!
//! Every parameter of the remote task is explicit here rather than baked into
//! call sites. Configuration is merged from:
//! 1. Built-in defaults (0–10 V, 1 kHz, 1000 finite samples, 10 s read timeout)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `DAQ_ACQ_`
//!
//! # Example
//! ```no_run
//! use daq_client::config::AcquisitionConfig;
//! use std::path::Path;
//!
//! let config = AcquisitionConfig::load(Some(Path::new("config/acquisition.toml")))?;
//! println!("Sampling at {} Hz", config.sample_rate);
//! # Ok::<(), daq_client::config::ConfigError>(())
//! ```
//!
//! A complete file:
//!
//! ```toml
//! session_prefix = "daq_grpc"
//! min_val = -5.0
//! max_val = 5.0
//! units = "volts"
//! terminal_config = "differential"
//! sample_rate = 2000.0
//! active_edge = "rising"
//! sample_mode = "finite"
//! samples_per_channel = 500
//! read_timeout = "15s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable prefix for configuration overrides.
///
/// Example: `DAQ_ACQ_SAMPLE_RATE=2000`
pub const ENV_PREFIX: &str = "DAQ_ACQ_";

/// Session name prefix used when no explicit name is configured.
pub const DEFAULT_SESSION_PREFIX: &str = "daq_grpc";

/// Longest accepted read timeout (one day).
pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Error types for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Parse error (invalid TOML, bad env value, unknown variant)
    #[error("Failed to parse config: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Input terminal configuration of the analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalConfig {
    /// Let the device choose (`DAQmx_Val_Cfg_Default`)
    #[default]
    Default,
    /// Referenced single-ended
    Rse,
    /// Non-referenced single-ended
    Nrse,
    /// Differential
    Differential,
    /// Pseudodifferential
    PseudoDifferential,
}

impl TerminalConfig {
    /// DAQmx constant sent on the wire.
    #[must_use]
    pub fn raw(self) -> i32 {
        match self {
            Self::Default => -1,
            Self::Rse => 10083,
            Self::Nrse => 10078,
            Self::Differential => 10106,
            Self::PseudoDifferential => 12529,
        }
    }
}

/// Units of the voltage channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoltageUnits {
    /// Volts
    #[default]
    Volts,
}

impl VoltageUnits {
    /// DAQmx constant sent on the wire.
    #[must_use]
    pub fn raw(self) -> i32 {
        match self {
            Self::Volts => 10348,
        }
    }
}

/// Sample clock edge on which samples are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveEdge {
    /// Rising edge
    #[default]
    Rising,
    /// Falling edge
    Falling,
}

impl ActiveEdge {
    /// DAQmx constant sent on the wire.
    #[must_use]
    pub fn raw(self) -> i32 {
        match self {
            Self::Rising => 10280,
            Self::Falling => 10171,
        }
    }
}

/// Acquisition mode of the sample clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Acquire `samples_per_channel` samples, then stop
    #[default]
    Finite,
    /// Acquire until the task is cleared; `samples_per_channel` sizes the buffer
    Continuous,
}

impl SampleMode {
    /// DAQmx constant sent on the wire.
    #[must_use]
    pub fn raw(self) -> i32 {
        match self {
            Self::Finite => 10178,
            Self::Continuous => 10123,
        }
    }
}

/// Channel, timing and read parameters of one remote acquisition task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Fixed task name. When unset a unique name is generated per session.
    ///
    /// A fixed name may be shared with other clients, so a `CreateTask` that
    /// fails in transport is not followed by a `ClearTask` for it.
    pub session_name: Option<String>,
    /// Prefix of generated task names
    pub session_prefix: String,
    /// Lower bound of the expected input range
    pub min_val: f64,
    /// Upper bound of the expected input range
    pub max_val: f64,
    /// Units of `min_val` / `max_val`
    pub units: VoltageUnits,
    /// Input terminal configuration
    pub terminal_config: TerminalConfig,
    /// Sample clock rate in samples per second per channel
    pub sample_rate: f64,
    /// Sample clock edge
    pub active_edge: ActiveEdge,
    /// Finite or continuous acquisition
    pub sample_mode: SampleMode,
    /// Samples per channel acquired by the clock and returned by each read
    pub samples_per_channel: u32,
    /// Time the server waits for samples before a read fails
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            session_name: None,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            min_val: 0.0,
            max_val: 10.0,
            units: VoltageUnits::Volts,
            terminal_config: TerminalConfig::Default,
            sample_rate: 1000.0,
            active_edge: ActiveEdge::Rising,
            sample_mode: SampleMode::Finite,
            samples_per_channel: 1000,
            read_timeout: Duration::from_secs(10),
        }
    }
}

impl AcquisitionConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// Environment variables override the file, e.g. `DAQ_ACQ_MAX_VAL=5`.
    /// The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            debug!("Loading acquisition config from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading or manual construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.session_name {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "session_name must not be empty when set".to_string(),
                ));
            }
        }

        if self.session_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session_prefix must not be empty".to_string(),
            ));
        }

        if !self.min_val.is_finite() || !self.max_val.is_finite() {
            return Err(ConfigError::Invalid(
                "voltage range bounds must be finite".to_string(),
            ));
        }

        if self.min_val >= self.max_val {
            return Err(ConfigError::Invalid(format!(
                "min_val ({}) must be less than max_val ({})",
                self.min_val, self.max_val
            )));
        }

        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }

        // ReadAnalogF64 carries the per-channel count as an int32
        if self.samples_per_channel == 0 || i32::try_from(self.samples_per_channel).is_err() {
            return Err(ConfigError::Invalid(format!(
                "samples_per_channel must be between 1 and {}, got {}",
                i32::MAX,
                self.samples_per_channel
            )));
        }

        if self.read_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "read_timeout must be greater than zero".to_string(),
            ));
        }

        if self.read_timeout > MAX_READ_TIMEOUT {
            return Err(ConfigError::Invalid(format!(
                "read_timeout must be at most {}s, got {}s",
                MAX_READ_TIMEOUT.as_secs(),
                self.read_timeout.as_secs()
            )));
        }

        Ok(())
    }
}
