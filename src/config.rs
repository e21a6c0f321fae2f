//! Engine configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dsp::wavetable::Waveform;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is outside its valid range.
    #[error("invalid config value '{key}': {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Audio timing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Capacity of every module's sample buffer.
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 512,
        }
    }
}

/// Per-waveform output gain used to level polyphonic oscillators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoGain {
    pub sine: f64,
    pub square: f64,
    pub triangle: f64,
    pub saw: f64,
    pub noise: f64,
}

impl AutoGain {
    /// Returns the gain for a waveform.
    pub fn for_waveform(&self, waveform: Waveform) -> f64 {
        match waveform {
            Waveform::Sine => self.sine,
            Waveform::Square => self.square,
            Waveform::Triangle => self.triangle,
            Waveform::Saw => self.saw,
            Waveform::Noise => self.noise,
        }
    }
}

impl Default for AutoGain {
    fn default() -> Self {
        Self {
            sine: 1.0,
            square: 0.5,
            triangle: 0.9,
            saw: 0.6,
            noise: 0.4,
        }
    }
}

/// Oscillator and voice settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    /// Number of samples in each generated wavetable.
    pub wavetable_size: usize,
    /// Typical number of simultaneous voices, used for gain staging.
    pub expected_voices: usize,
    /// Hard limit of voices a polyphonic oscillator preallocates.
    pub max_voices: usize,
    pub auto_gain: AutoGain,
}

impl OscillatorConfig {
    /// Gain that levels a polyphonic oscillator playing `waveform`.
    pub fn voice_gain(&self, waveform: Waveform) -> f64 {
        self.auto_gain.for_waveform(waveform) / (self.expected_voices.max(1) as f64).sqrt()
    }
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            wavetable_size: 2048,
            expected_voices: 8,
            max_voices: 16,
            auto_gain: AutoGain::default(),
        }
    }
}

/// Ring buffer capacities between the control plane and the processing loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub command_capacity: usize,
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_capacity: crate::engine::channels::DEFAULT_COMMAND_BUFFER_SIZE,
            event_capacity: crate::engine::channels::DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

/// Logging settings for the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub oscillator: OscillatorConfig,
    pub channels: ChannelConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable by the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than zero"));
        }
        if self.audio.buffer_size == 0 {
            return Err(invalid("audio.buffer_size", "must be greater than zero"));
        }
        if self.oscillator.wavetable_size < 2 {
            return Err(invalid("oscillator.wavetable_size", "must be at least 2"));
        }
        if self.oscillator.expected_voices == 0 {
            return Err(invalid("oscillator.expected_voices", "must be at least 1"));
        }
        if self.oscillator.max_voices == 0 {
            return Err(invalid("oscillator.max_voices", "must be at least 1"));
        }
        if self.channels.command_capacity == 0 || self.channels.event_capacity == 0 {
            return Err(invalid("channels", "capacities must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
