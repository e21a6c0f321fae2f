//! DSP module
//!
//! Core DSP traits and types.
//! Defines the Module trait, ports, parameters, modulation, MIDI and wavetables.

pub mod context;
pub mod midi;
pub mod modulation;
pub mod module_trait;
pub mod parameter;
pub mod port;
pub mod registry;
pub mod wavetable;

pub use context::{BuildContext, ProcessContext};
pub use midi::{MidiEvent, MidiNote, NoteTracker};
pub use modulation::{ModulationBinding, ModulationData, ModulationParameter, Modulator};
pub use module_trait::{EmptyView, Fault, Module, ModuleCore, SignalView};
pub use parameter::{
    ModulationStrategy, ParameterLimits, ParameterStore, ParameterType, ParameterValue, ValueKind,
};
pub use port::{PortClass, PortDirection, SignalType, Socket};
pub use registry::{ComponentType, ModuleDescriptor, ModuleRegistry, ModuleType, ModulatorType};
pub use wavetable::{Waveform, WavetableBank};
