//! MIDI input component.
//!
//! The entry point for notes coming from the control plane. Device
//! enumeration happens elsewhere; this component only forwards events.

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    midi::{MidiEvent, NOTE_COUNT},
    module_trait::{Module, ModuleCore, SignalView},
    registry::{ComponentType, ModulatorType, ModuleDescriptor},
};

/// Forwards note events to its MIDI listeners.
///
/// A NoteOff is followed by a NoteEnd, so a polyphonic module connected
/// directly (without an envelope in between) frees the voice immediately.
pub struct MidiInput {
    core: ModuleCore,
    pending: Vec<MidiEvent>,
}

impl MidiInput {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "MIDI Input",
        component_type: ComponentType::Modulator(ModulatorType::MidiInput),
        modulatable: &[],
        controllable: &[],
        audio_inputs: 0,
        audio_outputs: 0,
        midi_inputs: 0,
        midi_outputs: 1,
        modulation_outputs: 0,
        polyphonic: false,
    };

    pub fn new(ctx: &BuildContext) -> Self {
        Self {
            core: ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size()),
            pending: Vec::with_capacity(2 * NOTE_COUNT),
        }
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }
}

impl Module for MidiInput {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, _ctx: &ProcessContext, _view: &dyn SignalView) -> f64 {
        0.0
    }

    fn on_midi(&mut self, event: MidiEvent) {
        self.pending.push(event);
        if let MidiEvent::NoteOff { note } = event {
            self.pending.push(MidiEvent::NoteEnd { note });
        }
    }

    fn drain_midi(&mut self, out: &mut Vec<MidiEvent>) {
        out.append(&mut self.pending);
    }

    fn reset(&mut self) {
        self.core.reset();
        self.pending.clear();
    }
}
