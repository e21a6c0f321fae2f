//! Modulation bindings and the [`Modulator`] trait.
//!
//! A binding ties one parameter of a component to a modulator component.
//! Envelopes need to know which note a value belongs to and where its release
//! starts, so every binding carries a small [`ModulationData`] record that the
//! modulator reads and updates.

use serde::{Deserialize, Serialize};

use super::parameter::{ModulationStrategy, ParameterType};
use crate::engine::commands::ComponentId;

/// Keys of the per-binding modulation record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModulationParameter {
    /// Note number the modulated value belongs to.
    MidiNote,
    /// Value a ramp starts from (attack start, release start).
    InitialValue,
    /// Last value the modulator produced.
    LastValue,
}

impl ModulationParameter {
    pub const ALL: [ModulationParameter; 3] = [
        ModulationParameter::MidiNote,
        ModulationParameter::InitialValue,
        ModulationParameter::LastValue,
    ];

    fn index(&self) -> usize {
        *self as usize
    }
}

/// A fixed-size map from [`ModulationParameter`] to `f64`.
///
/// Copyable and allocation-free, so voices can clone it on the processing thread.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModulationData {
    values: [Option<f64>; 3],
}

impl ModulationData {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record holding zero for every listed key.
    pub fn seeded(required: &[ModulationParameter]) -> Self {
        let mut data = Self::new();
        data.seed(required);
        data
    }

    /// Inserts zero for every listed key that is not present yet.
    pub fn seed(&mut self, required: &[ModulationParameter]) {
        for p in required {
            self.values[p.index()].get_or_insert(0.0);
        }
    }

    pub fn get(&self, parameter: ModulationParameter) -> Option<f64> {
        self.values[parameter.index()]
    }

    pub fn set(&mut self, parameter: ModulationParameter, value: f64) {
        self.values[parameter.index()] = Some(value);
    }

    pub fn remove(&mut self, parameter: ModulationParameter) -> Option<f64> {
        self.values[parameter.index()].take()
    }

    pub fn contains(&self, parameter: ModulationParameter) -> bool {
        self.values[parameter.index()].is_some()
    }

    /// Returns true if every listed key is present.
    pub fn contains_all(&self, required: &[ModulationParameter]) -> bool {
        required.iter().all(|p| self.contains(*p))
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// The MIDI note key as a note number.
    pub fn midi_note(&self) -> Option<u8> {
        self.get(ModulationParameter::MidiNote)
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(0.0, 127.0) as u8)
    }

    /// Present entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ModulationParameter, f64)> + '_ {
        ModulationParameter::ALL
            .iter()
            .filter_map(|p| self.get(*p).map(|v| (*p, v)))
    }
}

/// One parameter bound to one modulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulationBinding {
    pub parameter: ParameterType,
    pub modulator: ComponentId,
    pub data: ModulationData,
}

impl ModulationBinding {
    pub fn new(parameter: ParameterType, modulator: ComponentId, data: ModulationData) -> Self {
        Self {
            parameter,
            modulator,
            data,
        }
    }
}

/// A component whose output shapes other components' parameters.
pub trait Modulator {
    /// Keys a binding must carry for [`Modulator::modulate`] to do anything.
    fn required_parameters(&self) -> &'static [ModulationParameter] {
        &[]
    }

    /// Returns the modulated form of `value`.
    ///
    /// `strategy` is the target parameter's strategy; `data` is the binding's
    /// record and may be updated. The caller clamps the result to the
    /// parameter's limits.
    fn modulate(&self, value: f64, strategy: ModulationStrategy, data: &mut ModulationData)
        -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_data() {
        let data = ModulationData::seeded(&[
            ModulationParameter::MidiNote,
            ModulationParameter::InitialValue,
        ]);
        assert_eq!(data.get(ModulationParameter::MidiNote), Some(0.0));
        assert_eq!(data.get(ModulationParameter::InitialValue), Some(0.0));
        assert_eq!(data.get(ModulationParameter::LastValue), None);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_seed_keeps_existing_values() {
        let mut data = ModulationData::new();
        data.set(ModulationParameter::MidiNote, 60.0);
        data.seed(&[ModulationParameter::MidiNote, ModulationParameter::LastValue]);
        assert_eq!(data.midi_note(), Some(60));
        assert_eq!(data.get(ModulationParameter::LastValue), Some(0.0));
    }

    #[test]
    fn test_contains_all_and_remove() {
        let mut data = ModulationData::seeded(&ModulationParameter::ALL);
        assert!(data.contains_all(&ModulationParameter::ALL));
        assert_eq!(data.remove(ModulationParameter::LastValue), Some(0.0));
        assert!(!data.contains_all(&ModulationParameter::ALL));
        assert_eq!(data.iter().count(), 2);
    }

    #[test]
    fn test_midi_note_conversion() {
        let mut data = ModulationData::new();
        assert_eq!(data.midi_note(), None);
        data.set(ModulationParameter::MidiNote, 300.0);
        assert_eq!(data.midi_note(), Some(127));
        data.set(ModulationParameter::MidiNote, f64::NAN);
        assert_eq!(data.midi_note(), None);
    }

    #[test]
    fn test_copies_are_independent() {
        let mut a = ModulationData::seeded(&[ModulationParameter::InitialValue]);
        let b = a;
        a.set(ModulationParameter::InitialValue, 0.7);
        assert_eq!(b.get(ModulationParameter::InitialValue), Some(0.0));
    }
}
