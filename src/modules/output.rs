//! Audio output module.
//!
//! This module serves as the final destination in the signal chain. The
//! external device sink pulls finished samples from it.

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::ParameterType,
    registry::{ComponentType, ModuleDescriptor, ModuleType},
};

/// The mono sink of an audio graph.
///
/// # Ports
///
/// - **In** (Audio, Input): every connected source is summed.
/// - **Modulation In 0**: Gain.
///
/// # Parameters
///
/// - **Gain** (0.0-1.0): output level, default 1.0.
pub struct AudioOutput {
    core: ModuleCore,
}

impl AudioOutput {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "Audio Output",
        component_type: ComponentType::Module(ModuleType::AudioOutput),
        modulatable: &[ParameterType::Gain],
        controllable: &[ParameterType::Gain],
        audio_inputs: 1,
        audio_outputs: 0,
        midi_inputs: 0,
        midi_outputs: 0,
        modulation_outputs: 0,
        polyphonic: false,
    };

    pub fn new(ctx: &BuildContext) -> Self {
        Self {
            core: ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size()),
        }
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }
}

impl Module for AudioOutput {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, _ctx: &ProcessContext, view: &dyn SignalView) -> f64 {
        let gain = self.core.parameters().effective_value(ParameterType::Gain);
        gain * self.core.sum_inputs(view)
    }
}
