//! Runtime context handed to components.
//!
//! [`ProcessContext`] is what a component sees on every tick;
//! [`BuildContext`] is what a factory sees when it instantiates one.

use std::sync::Arc;

use super::wavetable::WavetableBank;
use crate::config::{EngineConfig, OscillatorConfig};

/// Context provided to components while the graph is ticking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessContext {
    /// The audio sample rate in Hz.
    pub sample_rate: f64,
    /// Capacity of every component's sample buffer.
    pub buffer_size: usize,
    /// Duration of one tick in seconds.
    pub dt: f64,
}

impl ProcessContext {
    /// Creates a new processing context.
    pub fn new(sample_rate: f64, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size,
            dt: 1.0 / sample_rate,
        }
    }

    /// Highest frequency representable at this sample rate.
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(48_000.0, 512)
    }
}

/// Everything a component factory needs to build an instance.
///
/// Cloning is cheap; the wavetables are shared.
#[derive(Clone, Debug)]
pub struct BuildContext {
    pub process: ProcessContext,
    pub wavetables: Arc<WavetableBank>,
    pub oscillator: OscillatorConfig,
}

impl BuildContext {
    /// Builds the context described by an engine configuration, generating the wavetables.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            process: ProcessContext::new(
                config.audio.sample_rate as f64,
                config.audio.buffer_size,
            ),
            wavetables: Arc::new(WavetableBank::new(config.oscillator.wavetable_size)),
            oscillator: config.oscillator.clone(),
        }
    }

    /// Buffer capacity for new components.
    pub fn buffer_size(&self) -> usize {
        self.process.buffer_size
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
