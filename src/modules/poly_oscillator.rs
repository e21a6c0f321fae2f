//! Polyphonic oscillator.
//!
//! Plays one wavetable voice per held note. Voices are preallocated so note
//! handling never allocates on the processing thread.

use std::sync::Arc;

use crate::config::OscillatorConfig;
use crate::dsp::{
    context::{BuildContext, ProcessContext},
    midi::{MidiEvent, MidiNote},
    modulation::{ModulationBinding, ModulationParameter},
    module_trait::{Module, ModuleCore, SignalView},
    parameter::{ParameterType, ParameterValue},
    registry::{ComponentType, ModuleDescriptor, ModuleType},
    wavetable::{Waveform, WavetableBank},
};
use crate::engine::commands::ComponentId;
use crate::error::Result;

use super::oscillator::{selected_waveform, Phasor};

/// Parameters modulated per voice rather than on the whole module.
const VOICE_PARAMETERS: [ParameterType; 2] = [ParameterType::Amplitude, ParameterType::Frequency];

/// One voice of a [`PolyOscillator`].
///
/// Each voice carries its own copies of the module's modulation bindings, so
/// envelope state for one note never leaks into another.
#[derive(Clone, Debug)]
pub struct Voice {
    note: Option<u8>,
    released: bool,
    /// Frequency and amplitude from the note, before modulation.
    frequency: f64,
    amplitude: f64,
    /// Values used for the most recent sample.
    current_frequency: f64,
    current_amplitude: f64,
    phasor: Phasor,
    bindings: Vec<ModulationBinding>,
    /// Allocation order, used to steal the oldest voice.
    started: u64,
}

impl Voice {
    fn new(binding_capacity: usize) -> Self {
        Self {
            note: None,
            released: false,
            frequency: 0.0,
            amplitude: 0.0,
            current_frequency: 0.0,
            current_amplitude: 0.0,
            phasor: Phasor::new(),
            bindings: Vec::with_capacity(binding_capacity),
            started: 0,
        }
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn is_active(&self) -> bool {
        self.note.is_some()
    }

    /// True once the key has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn bindings(&self) -> &[ModulationBinding] {
        &self.bindings
    }

    pub fn binding(&self, parameter: ParameterType) -> Option<&ModulationBinding> {
        self.bindings.iter().find(|b| b.parameter == parameter)
    }

    /// Frequency used for the most recent sample.
    pub fn frequency(&self) -> f64 {
        self.current_frequency
    }

    /// Amplitude used for the most recent sample.
    pub fn amplitude(&self) -> f64 {
        self.current_amplitude
    }

    /// Drops the bindings `matches` selects. Unmodulated values fall back
    /// to the note's own.
    fn unbind(&mut self, matches: impl Fn(&ModulationBinding) -> bool) {
        self.bindings.retain(|b| !matches(b));
        if self.binding(ParameterType::Frequency).is_none() {
            self.current_frequency = self.frequency;
        }
        if self.binding(ParameterType::Amplitude).is_none() {
            self.current_amplitude = self.amplitude;
        }
    }

    fn free(&mut self) {
        self.note = None;
        self.released = false;
        self.bindings.clear();
    }
}

/// A polyphonic wavetable oscillator driven by MIDI notes.
///
/// # Ports
///
/// - **MIDI In**: NoteOn allocates a voice, NoteOff starts its release and
///   NoteEnd frees it.
/// - **Out** (Audio, Output): `Amplitude * Gain * sum(voices)`.
/// - **Modulation In 0/1/2**: Amplitude and Frequency (per voice), Gain.
///
/// # Parameters
///
/// - **Waveform**: changing it also resets Gain to the waveform's auto gain.
/// - **Amplitude** (0-1): overall level.
/// - **Gain** (0-1): defaults to `auto_gain / sqrt(expected_voices)`.
pub struct PolyOscillator {
    core: ModuleCore,
    wavetables: Arc<WavetableBank>,
    voices: Vec<Voice>,
    settings: OscillatorConfig,
    /// Counter for [`Voice::started`].
    allocations: u64,
}

impl PolyOscillator {
    pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor {
        name: "Polyphonic Oscillator",
        component_type: ComponentType::Module(ModuleType::PolyOscillator),
        modulatable: &[
            ParameterType::Amplitude,
            ParameterType::Frequency,
            ParameterType::Gain,
        ],
        controllable: &[ParameterType::Waveform, ParameterType::Amplitude],
        audio_inputs: 0,
        audio_outputs: 1,
        midi_inputs: 1,
        midi_outputs: 0,
        modulation_outputs: 0,
        polyphonic: true,
    };

    pub fn new(ctx: &BuildContext) -> Self {
        let binding_capacity = Self::DESCRIPTOR.modulation_inputs();
        let voices = (0..ctx.oscillator.max_voices.max(1))
            .map(|_| Voice::new(binding_capacity))
            .collect();
        let osc = Self {
            core: ModuleCore::new(Self::DESCRIPTOR, ctx.buffer_size()),
            wavetables: Arc::clone(&ctx.wavetables),
            voices,
            settings: ctx.oscillator.clone(),
            allocations: 0,
        };
        osc.apply_auto_gain(Waveform::default());
        osc
    }

    pub fn build(ctx: &BuildContext) -> Box<dyn Module> {
        Box::new(Self::new(ctx))
    }

    /// The voice playing `note`, if any.
    pub fn voice(&self, note: u8) -> Option<&Voice> {
        self.voices.iter().find(|v| v.note == Some(note))
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Default gain for a waveform, scaled for the expected voice count.
    pub fn auto_gain(&self, waveform: Waveform) -> f64 {
        self.settings.voice_gain(waveform)
    }

    fn apply_auto_gain(&self, waveform: Waveform) {
        // Gain is always in the store; the descriptor lists it as modulatable
        let _ = self
            .core
            .parameters()
            .set_f64(ParameterType::Gain, self.auto_gain(waveform));
    }

    fn note_on(&mut self, note: MidiNote) {
        let index = self
            .voices
            .iter()
            .position(|v| v.note == Some(note.note))
            .or_else(|| self.voices.iter().position(|v| !v.is_active()))
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.started)
                    .map(|(i, _)| i)
            });
        let Some(index) = index else {
            return;
        };

        self.allocations += 1;
        let voice = &mut self.voices[index];
        if voice.note != Some(note.note) {
            voice.phasor.reset();
        }
        voice.note = Some(note.note);
        voice.released = false;
        voice.frequency = note.frequency();
        voice.amplitude = note.amplitude();
        voice.current_frequency = voice.frequency;
        voice.current_amplitude = voice.amplitude;
        voice.started = self.allocations;

        voice.bindings.clear();
        for binding in self.core.bindings() {
            if !VOICE_PARAMETERS.contains(&binding.parameter) {
                continue;
            }
            let mut copy = *binding;
            copy.data.set(ModulationParameter::MidiNote, note.note as f64);
            copy.data.set(ModulationParameter::InitialValue, 0.0);
            voice.bindings.push(copy);
        }
    }

    fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == Some(note)) {
            voice.released = true;
            for binding in &mut voice.bindings {
                if let Some(last) = binding.data.get(ModulationParameter::LastValue) {
                    binding.data.set(ModulationParameter::InitialValue, last);
                }
            }
        }
    }

    fn note_end(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.note == Some(note)) {
            voice.free();
        }
    }
}

impl Module for PolyOscillator {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModuleCore {
        &mut self.core
    }

    fn next_sample(&mut self, ctx: &ProcessContext, view: &dyn SignalView) -> f64 {
        let params = self.core.parameters();
        let level = params.effective_value(ParameterType::Amplitude)
            * params.effective_value(ParameterType::Gain);
        let waveform = selected_waveform(&self.core);
        let nyquist = ctx.nyquist();

        let mut sum = 0.0;
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            let mut frequency = voice.frequency;
            let mut amplitude = voice.amplitude;
            for binding in &mut voice.bindings {
                let Some(modulator) = view.modulator(binding.modulator) else {
                    continue;
                };
                let p = binding.parameter;
                let target = match p {
                    ParameterType::Frequency => &mut frequency,
                    ParameterType::Amplitude => &mut amplitude,
                    _ => continue,
                };
                let modulated = modulator.modulate(*target, p.modulation_strategy(), &mut binding.data);
                *target = p.limits().clamp(modulated);
            }
            voice.current_frequency = frequency;
            voice.current_amplitude = amplitude;

            let phase = voice.phasor.advance(frequency.min(nyquist), ctx.sample_rate);
            sum += self.wavetables.sample(waveform, phase) * amplitude;
        }
        level * sum
    }

    fn apply_modulation(&mut self, view: &dyn SignalView) {
        // amplitude and frequency are modulated per voice
        self.core
            .apply_bindings(view, |p| !VOICE_PARAMETERS.contains(&p));
    }

    fn set_parameter_value(
        &self,
        parameter: ParameterType,
        value: ParameterValue,
    ) -> Result<ParameterValue> {
        let stored = self.core.set_controllable(parameter, value)?;
        if let ParameterValue::Waveform(waveform) = stored {
            self.apply_auto_gain(waveform);
        }
        Ok(stored)
    }

    fn voices(&self) -> &[Voice] {
        &self.voices
    }

    fn clear_parameter_modulation(&mut self, parameter: ParameterType) -> bool {
        for voice in &mut self.voices {
            voice.unbind(|b| b.parameter == parameter);
        }
        self.core.unbind(parameter).is_some()
    }

    fn clear_modulator(&mut self, modulator: ComponentId) -> usize {
        for voice in &mut self.voices {
            voice.unbind(|b| b.modulator == modulator);
        }
        self.core.unbind_modulator(modulator)
    }

    fn on_midi(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn { note, velocity } => self.note_on(MidiNote::new(note, velocity)),
            MidiEvent::NoteOff { note } => self.note_off(note),
            MidiEvent::NoteEnd { note } => self.note_end(note),
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        for voice in &mut self.voices {
            voice.free();
            voice.phasor.reset();
        }
    }
}
