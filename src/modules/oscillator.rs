//! Oscillator modules.
//!
//! This module contains the monophonic wavetable oscillator and the phase
//! accumulator shared by every wavetable-driven component.

use std::sync::Arc;

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::ParameterType,
    registry::{ComponentType, ModuleDescriptor, ModuleType},
    wavetable::{Waveform, WavetableBank},
};

/// Phase accumulator running from 0.0 up to (not including) 1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Phasor {
    phase: f64,
}

impl Phasor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase and advances by `frequency / sample_rate`.
    pub fn advance(&mut self, frequency: f64, sample_rate: f64) -> f64 {
        let phase = self.phase;
        self.phase = (phase + frequency.max(0.0) / sample_rate).fract();
        phase
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Reads the waveform selected in a parameter store.
pub(crate) fn selected_waveform(core: &ModuleCore) -> Waveform {
    let index = core.parameters().base_value(ParameterType::Waveform);
    Waveform::from_index(index.round().max(0.0) as usize)
}

/// A monophonic wavetable oscillator.
///
/// # Ports
///
/// - **Out** (Audio, Output): the generated waveform.
/// - **Modulation In 0/1**: Amplitude and Frequency.
///
/// # Parameters
///
/// - **Waveform**: SINE, SQUARE, TRIANGLE, SAW or NOISE.
/// - **Frequency** (0-20000 Hz), clamped to Nyquist while running.
/// - **Amplitude** (0-1).
pub struct Oscillator {
    core: ModuleCore,
    /// Shared, read-only tables.
    wavetables: Arc<WavetableBank>,
    phasor: Phasor,
}

impl Oscillator {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "Oscillator",
        component_type: ComponentType::Module(ModuleType::Oscillator),
        modulatable: &[ParameterType::Amplitude, ParameterType::Frequency],
        controllable: &[
            ParameterType::Waveform,
            ParameterType::Amplitude,
            ParameterType::Frequency,
        ],
        audio_inputs: 0,
        audio_outputs: 1,
        midi_inputs: 0,
        midi_outputs: 0,
        modulation_outputs: 0,
        polyphonic: false,
    };

    /// Creates a new oscillator at 440 Hz, full amplitude, sine.
    pub fn new(ctx: &BuildContext) -> Self {
        Self {
            core: ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size()),
            wavetables: Arc::clone(&ctx.wavetables),
            phasor: Phasor::new(),
        }
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }

    /// Phase the next sample will be read at.
    pub fn phase(&self) -> f64 {
        self.phasor.phase()
    }
}

impl Module for Oscillator {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, ctx: &ProcessContext, _view: &dyn SignalView) -> f64 {
        let params = self.core.parameters();
        let frequency = params
            .effective_value(ParameterType::Frequency)
            .min(ctx.nyquist());
        let amplitude = params.effective_value(ParameterType::Amplitude);
        let waveform = selected_waveform(&self.core);

        let phase = self.phasor.advance(frequency, ctx.sample_rate);
        self.wavetables.sample(waveform, phase) * amplitude
    }

    fn reset(&mut self) {
        self.core.reset();
        self.phasor.reset();
    }
}
