//! LFO (Low Frequency Oscillator) module.
//!
//! Generates low-frequency control signals for modulation purposes.

use std::sync::Arc;

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    modulation::{ModulationData, Modulator},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::{ModulationStrategy, ParameterType},
    registry::{ComponentType, ModulatorType, ModuleDescriptor},
    wavetable::WavetableBank,
};

use super::oscillator::{selected_waveform, Phasor};

/// A low-frequency oscillator for modulation.
///
/// Produces a signal `m` in [-1, 1] from the shared wavetables. A bound
/// parameter becomes `strategy(value, depth, m)`, where the strategy is the
/// target parameter's.
///
/// # Ports
///
/// - **Modulation Out**: feeds any modulatable parameter.
/// - **Modulation In 0/1**: Frequency, Depth.
///
/// # Parameters
///
/// - **Waveform**: shape of the signal.
/// - **Frequency** (Hz): rate, default 1 Hz.
/// - **Depth** (-5 to 5): modulation amount, default 1.
pub struct Lfo {
    core: ModuleCore,
    wavetables: Arc<WavetableBank>,
    phasor: Phasor,
    /// Most recent output in [-1, 1].
    signal: f64,
}

impl Lfo {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "LFO",
        component_type: ComponentType::Modulator(ModulatorType::Lfo),
        modulatable: &[ParameterType::Frequency, ParameterType::Depth],
        controllable: &[
            ParameterType::Waveform,
            ParameterType::Frequency,
            ParameterType::Depth,
        ],
        audio_inputs: 0,
        audio_outputs: 0,
        midi_inputs: 0,
        midi_outputs: 0,
        modulation_outputs: 1,
        polyphonic: false,
    };

    /// Rate a new LFO starts with.
    pub const DEFAULT_RATE: f64 = 1.0;

    pub fn new(ctx: &BuildContext) -> Self {
        let core = ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size());
        // Frequency is always in the store; the descriptor lists it
        let _ = core
            .parameters()
            .set_f64(ParameterType::Frequency, Self::DEFAULT_RATE);
        Self {
            core,
            wavetables: Arc::clone(&ctx.wavetables),
            phasor: Phasor::new(),
            signal: 0.0,
        }
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }

    /// Most recent output in [-1, 1].
    pub fn signal(&self) -> f64 {
        self.signal
    }
}

impl Module for Lfo {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, ctx: &ProcessContext, _view: &dyn SignalView) -> f64 {
        let frequency = self
            .core
            .parameters()
            .effective_value(ParameterType::Frequency)
            .min(ctx.nyquist());
        let waveform = selected_waveform(&self.core);
        let phase = self.phasor.advance(frequency, ctx.sample_rate);
        self.signal = self.wavetables.sample(waveform, phase);
        self.signal
    }

    fn as_modulator(&self) -> Option<&dyn Modulator> {
        Some(self)
    }

    fn reset(&mut self) {
        self.core.reset();
        self.phasor.reset();
        self.signal = 0.0;
    }
}

impl Modulator for Lfo {
    fn modulate(
        &self,
        value: f64,
        strategy: ModulationStrategy,
        _data: &mut ModulationData,
    ) -> f64 {
        let depth = self.core.parameters().effective_value(ParameterType::Depth);
        strategy.apply(value, depth, self.signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::module_trait::EmptyView;
    use crate::dsp::parameter::ParameterValue;
    use crate::dsp::wavetable::Waveform;

    #[test]
    fn test_default_rate() {
        let lfo = Lfo::new(&BuildContext::default());
        assert_eq!(
            lfo.core().parameters().base_value(ParameterType::Frequency),
            Lfo::DEFAULT_RATE
        );
        assert!(lfo.as_modulator().is_some());
        assert!(lfo.required_parameters().is_empty());
    }

    #[test]
    fn test_signal_is_bounded() {
        let ctx = BuildContext::default();
        let mut lfo = Lfo::new(&ctx);
        lfo.set_parameter_value(ParameterType::Frequency, ParameterValue::Double(50.0))
            .unwrap();
        for _ in 0..4_800 {
            lfo.tick();
            let s = lfo.calculate_sample(&ctx.process, &EmptyView).unwrap();
            assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&s));
        }
    }

    #[test]
    fn test_modulate_uses_strategy_and_depth() {
        let ctx = BuildContext::default();
        let mut lfo = Lfo::new(&ctx);
        lfo.set_parameter_value(ParameterType::Waveform, ParameterValue::Waveform(Waveform::Square))
            .unwrap();
        lfo.set_parameter_value(ParameterType::Depth, ParameterValue::Float(0.5))
            .unwrap();
        // skip the band-limited edge at phase 0
        for _ in 0..100 {
            lfo.tick();
            lfo.calculate_sample(&ctx.process, &EmptyView).unwrap();
        }
        assert!((lfo.signal() - 1.0).abs() < 1e-9);

        let mut data = ModulationData::new();
        let v = lfo.modulate(440.0, ModulationStrategy::Exponential, &mut data);
        assert!((v - 440.0 * 2f64.powf(0.5)).abs() < 1e-6);
        let v = lfo.modulate(0.2, ModulationStrategy::Linear, &mut data);
        assert!((v - 0.7).abs() < 1e-9);
        assert!(data.is_empty());
    }

    #[test]
    fn test_zero_signal_leaves_value() {
        let lfo = Lfo::new(&BuildContext::default());
        let mut data = ModulationData::new();
        assert_eq!(lfo.modulate(0.3, ModulationStrategy::Linear, &mut data), 0.3);
    }
}
