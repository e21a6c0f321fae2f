//! Component types, descriptors and the registry that instantiates them.
//!
//! The registry is the central catalog of component types. Each entry pairs a
//! static [`ModuleDescriptor`] with a factory, so the lifecycle manager can
//! validate requests against the descriptor before anything is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::context::BuildContext;
use super::module_trait::Module;
use super::parameter::ParameterType;
use super::port::PortClass;
use crate::error::{EngineError, Result};
use crate::modules::{
    AudioOutput, BiquadFilter, Envelope, Lfo, MidiInput, Oscillator, PolyOscillator,
};

/// Components that produce or consume audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleType {
    Oscillator,
    PolyOscillator,
    AudioOutput,
    BiquadFilter,
}

/// Components that shape other components' parameters or route notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModulatorType {
    LinearFader,
    AdsrEnvelope,
    Lfo,
    MidiInput,
}

/// Any registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Module(ModuleType),
    Modulator(ModulatorType),
}

impl ComponentType {
    /// Every component type known to the engine.
    pub const ALL: [ComponentType; 8] = [
        ComponentType::Module(ModuleType::Oscillator),
        ComponentType::Module(ModuleType::PolyOscillator),
        ComponentType::Module(ModuleType::AudioOutput),
        ComponentType::Module(ModuleType::BiquadFilter),
        ComponentType::Modulator(ModulatorType::LinearFader),
        ComponentType::Modulator(ModulatorType::AdsrEnvelope),
        ComponentType::Modulator(ModulatorType::Lfo),
        ComponentType::Modulator(ModulatorType::MidiInput),
    ];

    pub fn is_module(&self) -> bool {
        matches!(self, ComponentType::Module(_))
    }

    pub fn is_modulator(&self) -> bool {
        matches!(self, ComponentType::Modulator(_))
    }

    /// Returns the wire name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            ComponentType::Module(ModuleType::Oscillator) => "OSCILLATOR",
            ComponentType::Module(ModuleType::PolyOscillator) => "POLY_OSCILLATOR",
            ComponentType::Module(ModuleType::AudioOutput) => "AUDIO_OUTPUT",
            ComponentType::Module(ModuleType::BiquadFilter) => "BIQUAD_FILTER",
            ComponentType::Modulator(ModulatorType::LinearFader) => "LINEAR_FADER",
            ComponentType::Modulator(ModulatorType::AdsrEnvelope) => "ADSR_ENVELOPE",
            ComponentType::Modulator(ModulatorType::Lfo) => "LFO",
            ComponentType::Modulator(ModulatorType::MidiInput) => "MIDI_INPUT",
        }
    }
}

impl From<ModuleType> for ComponentType {
    fn from(t: ModuleType) -> Self {
        ComponentType::Module(t)
    }
}

impl From<ModulatorType> for ComponentType {
    fn from(t: ModulatorType) -> Self {
        ComponentType::Modulator(t)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static description of a component type: its parameters and port arities.
///
/// Modulation-in port `i` addresses `modulatable[i]`, so the number of
/// modulation inputs is the number of modulatable parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModuleDescriptor {
    /// Human-readable name (e.g., "Polyphonic Oscillator").
    pub name: &'static str,
    pub component_type: ComponentType,
    /// Parameters a modulator may be bound to.
    pub modulatable: &'static [ParameterType],
    /// Parameters the control plane may set.
    pub controllable: &'static [ParameterType],
    pub audio_inputs: usize,
    pub audio_outputs: usize,
    pub midi_inputs: usize,
    pub midi_outputs: usize,
    pub modulation_outputs: usize,
    /// True if the component plays one voice per held note.
    pub polyphonic: bool,
}

impl ModuleDescriptor {
    pub fn modulation_inputs(&self) -> usize {
        self.modulatable.len()
    }

    /// Number of ports of a class.
    pub fn port_count(&self, class: PortClass) -> usize {
        match class {
            PortClass::AudioIn => self.audio_inputs,
            PortClass::AudioOut => self.audio_outputs,
            PortClass::MidiIn => self.midi_inputs,
            PortClass::MidiOut => self.midi_outputs,
            PortClass::ModulationIn => self.modulation_inputs(),
            PortClass::ModulationOut => self.modulation_outputs,
        }
    }

    pub fn is_controllable(&self, parameter: ParameterType) -> bool {
        self.controllable.contains(&parameter)
    }

    pub fn is_modulatable(&self, parameter: ParameterType) -> bool {
        self.modulatable.contains(&parameter)
    }

    /// Parameter addressed by modulation-in port `port`.
    pub fn modulated_parameter(&self, port: usize) -> Option<ParameterType> {
        self.modulatable.get(port).copied()
    }

    /// Modulation-in port addressing `parameter`.
    pub fn modulation_port(&self, parameter: ParameterType) -> Option<usize> {
        self.modulatable.iter().position(|p| *p == parameter)
    }

    /// Controllable and modulatable parameters, without duplicates.
    pub fn parameter_types(&self) -> Vec<ParameterType> {
        let mut types: Vec<ParameterType> = self.controllable.to_vec();
        for p in self.modulatable {
            if !types.contains(p) {
                types.push(*p);
            }
        }
        types
    }
}

/// Factory function type for creating component instances.
pub type ModuleFactory = fn(&BuildContext) -> Box<dyn Module>;

struct RegistryEntry {
    descriptor: ModuleDescriptor,
    factory: ModuleFactory,
}

/// Central registry of available component types.
///
/// Read-only once built; share it with `Arc`.
pub struct ModuleRegistry {
    entries: BTreeMap<ComponentType, RegistryEntry>,
}

impl ModuleRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Creates a registry holding every built-in component type.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Oscillator::DESCRIPTOR, Oscillator::build);
        registry.register(PolyOscillator::DESCRIPTOR, PolyOscillator::build);
        registry.register(AudioOutput::DESCRIPTOR, AudioOutput::build);
        registry.register(BiquadFilter::DESCRIPTOR, BiquadFilter::build);
        registry.register(Envelope::LINEAR_FADER, Envelope::build_linear_fader);
        registry.register(Envelope::ADSR, Envelope::build_adsr);
        registry.register(Lfo::DESCRIPTOR, Lfo::build);
        registry.register(MidiInput::DESCRIPTOR, MidiInput::build);
        registry
    }

    /// The process-wide built-in registry, built on first use.
    pub fn builtin() -> Arc<ModuleRegistry> {
        static BUILTIN: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| Arc::new(ModuleRegistry::with_builtin())))
    }

    /// Registers a component type.
    ///
    /// Returns false and leaves the registry unchanged if the type is already
    /// registered.
    pub fn register(&mut self, descriptor: ModuleDescriptor, factory: ModuleFactory) -> bool {
        let component_type = descriptor.component_type;
        if self.entries.contains_key(&component_type) {
            warn!(%component_type, "component type is already registered");
            return false;
        }
        self.entries.insert(
            component_type,
            RegistryEntry {
                descriptor,
                factory,
            },
        );
        true
    }

    /// Looks up the descriptor of a component type.
    pub fn describe(&self, component_type: ComponentType) -> Result<&ModuleDescriptor> {
        self.entries
            .get(&component_type)
            .map(|e| &e.descriptor)
            .ok_or(EngineError::UnknownComponentType(component_type))
    }

    /// Builds a new instance of a component type.
    pub fn create(
        &self,
        component_type: ComponentType,
        ctx: &BuildContext,
    ) -> Result<Box<dyn Module>> {
        let entry = self
            .entries
            .get(&component_type)
            .ok_or(EngineError::UnknownComponentType(component_type))?;
        Ok((entry.factory)(ctx))
    }

    /// Every registered descriptor, in [`ComponentType`] order.
    pub fn all(&self) -> impl Iterator<Item = (ComponentType, &ModuleDescriptor)> + '_ {
        self.entries.iter().map(|(t, e)| (*t, &e.descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, component_type: ComponentType) -> bool {
        self.entries.contains_key(&component_type)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_builtin_is_total() {
        let registry = ModuleRegistry::builtin();
        assert_eq!(registry.len(), ComponentType::ALL.len());
        for t in ComponentType::ALL {
            let descriptor = registry.describe(t).unwrap();
            assert_eq!(descriptor.component_type, t);
        }
    }

    #[test]
    fn test_builtin_is_shared() {
        let a = ModuleRegistry::builtin();
        let b = ModuleRegistry::builtin();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_describe_unknown_type() {
        let registry = ModuleRegistry::new();
        let err = registry
            .describe(ComponentType::Module(ModuleType::Oscillator))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.register(Oscillator::DESCRIPTOR, Oscillator::build));
        assert!(!registry.register(Oscillator::DESCRIPTOR, Oscillator::build));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_module() {
        let registry = ModuleRegistry::builtin();
        let ctx = BuildContext::default();
        let t = ComponentType::Module(ModuleType::PolyOscillator);
        let module = registry.create(t, &ctx).unwrap();
        assert_eq!(module.component_type(), t);
        assert_eq!(module.core().capacity(), ctx.buffer_size());
    }

    #[test]
    fn test_create_unknown_module() {
        let registry = ModuleRegistry::new();
        let result = registry.create(
            ComponentType::Modulator(ModulatorType::Lfo),
            &BuildContext::default(),
        );
        assert!(matches!(result, Err(EngineError::UnknownComponentType(_))));
    }

    #[test]
    fn test_catalog_entries() {
        let registry = ModuleRegistry::builtin();

        let osc = registry.describe(ModuleType::Oscillator.into()).unwrap();
        assert_eq!(osc.name, "Oscillator");
        assert_eq!(osc.modulatable, &[ParameterType::Amplitude, ParameterType::Frequency]);
        assert_eq!(osc.port_count(PortClass::AudioOut), 1);
        assert_eq!(osc.port_count(PortClass::ModulationIn), 2);
        assert_eq!(osc.port_count(PortClass::MidiIn), 0);

        let poly = registry.describe(ModuleType::PolyOscillator.into()).unwrap();
        assert_eq!(poly.name, "Polyphonic Oscillator");
        assert!(poly.polyphonic);
        assert_eq!(poly.modulation_port(ParameterType::Gain), Some(2));
        assert!(!poly.is_controllable(ParameterType::Frequency));

        let adsr = registry.describe(ModulatorType::AdsrEnvelope.into()).unwrap();
        assert_eq!(adsr.port_count(PortClass::MidiIn), 1);
        assert_eq!(adsr.port_count(PortClass::MidiOut), 1);
        assert_eq!(adsr.port_count(PortClass::ModulationOut), 1);

        let filter = registry.describe(ModuleType::BiquadFilter.into()).unwrap();
        assert_eq!(filter.port_count(PortClass::AudioIn), 1);
        assert_eq!(filter.port_count(PortClass::AudioOut), 1);
        assert_eq!(filter.modulated_parameter(0), Some(ParameterType::Cutoff));
        assert!(filter.is_controllable(ParameterType::FilterType));
        assert!(filter.is_controllable(ParameterType::QFactor));

        let midi = registry.describe(ModulatorType::MidiInput.into()).unwrap();
        assert_eq!(midi.port_count(PortClass::MidiOut), 1);
        assert_eq!(midi.modulation_inputs(), 0);
    }

    #[test]
    fn test_parameter_types_union() {
        let registry = ModuleRegistry::builtin();
        let poly = registry.describe(ModuleType::PolyOscillator.into()).unwrap();
        assert_eq!(
            poly.parameter_types(),
            vec![
                ParameterType::Waveform,
                ParameterType::Amplitude,
                ParameterType::Frequency,
                ParameterType::Gain,
            ]
        );
    }

    #[test]
    fn test_all_is_ordered() {
        let registry = ModuleRegistry::builtin();
        let types: Vec<ComponentType> = registry.all().map(|(t, _)| t).collect();
        assert_eq!(types, ComponentType::ALL.to_vec());
    }

    #[test]
    fn test_component_type_serde() {
        let t = ComponentType::Module(ModuleType::Oscillator);
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"module":"OSCILLATOR"}"#);
        let back: ComponentType = serde_json::from_str(r#"{"modulator":"ADSR_ENVELOPE"}"#).unwrap();
        assert_eq!(back, ComponentType::Modulator(ModulatorType::AdsrEnvelope));
        assert_eq!(back.to_string(), "ADSR_ENVELOPE");
        assert!(back.is_modulator());
    }
}
