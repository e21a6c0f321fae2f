//! Note envelopes: the linear fader and the ADSR envelope.
//!
//! Envelopes sit on the MIDI path between a note source and a polyphonic
//! module. They pass NoteOn and NoteOff through immediately, track how long
//! each note has been held or released, and send NoteEnd once a note's
//! release has finished. Bound parameters are shaped per note through the
//! binding's [`ModulationData`].

use crate::dsp::{
    context::{BuildContext, ProcessContext},
    midi::{MidiEvent, NoteTracker, NOTE_COUNT},
    modulation::{ModulationData, ModulationParameter, Modulator},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::{ModulationStrategy, ParameterStore, ParameterType},
    registry::{ComponentType, ModulatorType, ModuleDescriptor},
};

/// Envelope shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Attack ramp, hold, release ramp.
    Linear,
    /// Attack ramp, decay to the sustain level, hold, release ramp.
    Adsr,
}

/// Keys an envelope needs in a binding.
const REQUIRED: [ModulationParameter; 2] = [
    ModulationParameter::MidiNote,
    ModulationParameter::InitialValue,
];

/// A per-note envelope.
///
/// # Ports
///
/// - **MIDI In**: note events from a MIDI source.
/// - **MIDI Out**: the same events, with NoteEnd delayed by the release time.
/// - **Modulation Out**: feeds per-voice parameters.
///
/// # Parameters
///
/// - **Attack** (0.001-4 s): ramp from the binding's initial value to the target.
/// - **Decay** (0.001-4 s, ADSR only): ramp from the target to `sustain * target`.
/// - **Sustain** (0-1, ADSR only): held fraction of the target.
/// - **Release** (0.001-4 s): ramp from the value at release down to 0.
pub struct Envelope {
    kind: EnvelopeKind,
    core: ModuleCore,
    notes: NoteTracker,
    /// Outgoing events, drained by the graph after every tick.
    pending: Vec<MidiEvent>,
}

impl Envelope {
    pub const LINEAR_FADER: ModuleDescriptor = ModuleDescriptor {
        name: "Linear Fader",
        component_type: ComponentType::Modulator(ModulatorType::LinearFader),
        modulatable: &[ParameterType::Attack, ParameterType::Release],
        controllable: &[ParameterType::Attack, ParameterType::Release],
        audio_inputs: 0,
        audio_outputs: 0,
        midi_inputs: 1,
        midi_outputs: 1,
        modulation_outputs: 1,
        polyphonic: false,
    };

    pub const ADSR: ModuleDescriptor = ModuleDescriptor {
        name: "ADSR Envelope",
        component_type: ComponentType::Modulator(ModulatorType::AdsrEnvelope),
        modulatable: &[
            ParameterType::Attack,
            ParameterType::Decay,
            ParameterType::Sustain,
            ParameterType::Release,
        ],
        controllable: &[
            ParameterType::Attack,
            ParameterType::Decay,
            ParameterType::Sustain,
            ParameterType::Release,
        ],
        audio_inputs: 0,
        audio_outputs: 0,
        midi_inputs: 1,
        midi_outputs: 1,
        modulation_outputs: 1,
        polyphonic: false,
    };

    pub fn new(kind: EnvelopeKind, ctx: &BuildContext) -> Self {
        let descriptor = match kind {
            EnvelopeKind::Linear => Self::LINEAR_FADER,
            EnvelopeKind::Adsr => Self::ADSR,
        };
        Self {
            kind,
            core: ModuleCore::new(descriptor, ctx.buffer_size()),
            notes: NoteTracker::new(),
            pending: Vec::with_capacity(2 * NOTE_COUNT),
        }
    }

    pub fn build_linear_fader(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(EnvelopeKind::Linear, ctx))
    }

    pub fn build_adsr(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(EnvelopeKind::Adsr, ctx))
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Notes currently held or releasing.
    pub fn notes(&self) -> &NoteTracker {
        &self.notes
    }

    /// Value while the key is held, `t` seconds after the press.
    fn held(&self, params: &ParameterStore, value: f64, initial: f64, t: f64) -> f64 {
        let attack = params.effective_value(ParameterType::Attack);
        if t < attack {
            return initial + (value - initial) * (t / attack);
        }
        match self.kind {
            EnvelopeKind::Linear => value,
            EnvelopeKind::Adsr => {
                let decay = params.effective_value(ParameterType::Decay);
                let sustain = params.effective_value(ParameterType::Sustain) * value;
                let t = t - attack;
                if t < decay {
                    value + (sustain - value) * (t / decay)
                } else {
                    sustain
                }
            }
        }
    }

    /// Value after the key was released, `t` seconds ago, from `initial`.
    fn released(&self, params: &ParameterStore, initial: f64, t: f64) -> f64 {
        let release = params.effective_value(ParameterType::Release);
        if t < release {
            initial * (1.0 - t / release)
        } else {
            0.0
        }
    }
}

impl Module for Envelope {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    /// Advances note clocks and ends finished releases. Envelopes have no
    /// audio output, so the sample is silence.
    fn next_sample(&mut self, ctx: &ProcessContext, _view: &dyn SignalView) -> f64 {
        self.notes.advance(ctx.dt);
        let release = self
            .core
            .parameters()
            .effective_value(ParameterType::Release);
        for note in 0..NOTE_COUNT as u8 {
            let finished = self
                .notes
                .get(note)
                .is_some_and(|s| !s.pressed && s.time >= release);
            if finished {
                self.notes.remove(note);
                self.pending.push(MidiEvent::NoteEnd { note });
            }
        }
        0.0
    }

    fn on_midi(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn { note, velocity } => {
                self.notes.press(note, velocity);
                self.pending.push(event);
            }
            MidiEvent::NoteOff { note } => {
                self.notes.release(note);
                self.pending.push(event);
            }
            // the envelope decides when its notes end
            MidiEvent::NoteEnd { .. } => {}
        }
    }

    fn drain_midi(&mut self, out: &mut Vec<MidiEvent>) {
        out.append(&mut self.pending);
    }

    fn as_modulator(&self) -> Option<&dyn Modulator> {
        Some(self)
    }

    fn reset(&mut self) {
        self.core.reset();
        self.notes.clear();
        self.pending.clear();
    }
}

impl Modulator for Envelope {
    fn required_parameters(&self) -> &'static [ModulationParameter] {
        &REQUIRED
    }

    fn modulate(
        &self,
        value: f64,
        _strategy: ModulationStrategy,
        data: &mut ModulationData,
    ) -> f64 {
        let (Some(note), Some(initial)) =
            (data.midi_note(), data.get(ModulationParameter::InitialValue))
        else {
            return value;
        };
        let Some(state) = self.notes.get(note) else {
            return value;
        };

        let params = self.core.parameters();
        let shaped = if state.pressed {
            self.held(params, value, initial, state.time)
        } else {
            self.released(params, initial, state.time)
        };
        data.set(ModulationParameter::LastValue, shaped);
        shaped
    }
}
