//! The core Module trait and supporting types.
//!
//! Every component in the graph implements [`Module`]. The shared bookkeeping
//! (sample buffer, write cursor, upstream ids, parameter store and modulation
//! bindings) lives in [`ModuleCore`] so that implementations only provide the
//! per-sample computation.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::context::ProcessContext;
use super::midi::MidiEvent;
use super::modulation::{ModulationBinding, ModulationData, ModulationParameter, Modulator};
use super::parameter::{ParameterStore, ParameterType, ParameterValue};
use super::registry::{ComponentType, ModuleDescriptor};
use crate::engine::commands::ComponentId;
use crate::modules::Voice;
use crate::error::{EngineError, Result};

/// Read access to the rest of the graph while one component computes.
pub trait SignalView {
    /// Current output of a component, or silence if it does not exist.
    fn current_sample(&self, id: ComponentId) -> f64;

    /// The component as a modulator, if it is one.
    fn modulator(&self, id: ComponentId) -> Option<&dyn Modulator>;
}

/// A view with no other components. Useful for modules evaluated alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyView;

impl SignalView for EmptyView {
    fn current_sample(&self, _id: ComponentId) -> f64 {
        0.0
    }

    fn modulator(&self, _id: ComponentId) -> Option<&dyn Modulator> {
        None
    }
}

/// Why a component stopped producing sound.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum Fault {
    #[error("write cursor {cursor} outside buffer of {capacity} samples")]
    CursorOutOfRange { cursor: usize, capacity: usize },

    #[error("produced non-finite sample {0}")]
    NonFinite(f64),
}

/// State shared by every component.
#[derive(Debug)]
pub struct ModuleCore {
    id: ComponentId,
    descriptor: ModuleDescriptor,
    buffer: Vec<f64>,
    cursor: usize,
    inputs: Vec<ComponentId>,
    parameters: Arc<ParameterStore>,
    bindings: Vec<ModulationBinding>,
    faulted: bool,
}

impl ModuleCore {
    /// Creates the core for a descriptor. The store holds every controllable
    /// and modulatable parameter at its default.
    pub fn new(descriptor: ModuleDescriptor, buffer_size: usize) -> Self {
        let parameters = Arc::new(ParameterStore::new(&descriptor.parameter_types()));
        Self {
            id: 0,
            descriptor,
            buffer: vec![0.0; buffer_size.max(1)],
            cursor: 0,
            inputs: Vec::new(),
            parameters,
            bindings: Vec::with_capacity(descriptor.modulation_inputs()),
            faulted: false,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn set_id(&mut self, id: ComponentId) {
        self.id = id;
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.parameters
    }

    /// Capacity of the sample buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    /// Upstream audio sources, in connection order.
    pub fn inputs(&self) -> &[ComponentId] {
        &self.inputs
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Advances the write cursor by one slot. The only place it wraps.
    pub fn advance_cursor(&mut self) {
        self.cursor = (self.cursor + 1) % self.buffer.len().max(1);
    }

    /// Sample at the write cursor, silence once faulted.
    pub fn current_sample(&self) -> f64 {
        if self.faulted {
            return 0.0;
        }
        self.buffer.get(self.cursor).copied().unwrap_or(0.0)
    }

    /// Stores a sample at the cursor.
    ///
    /// A cursor outside the buffer or a non-finite sample faults the
    /// component; it stays silent from then on.
    pub fn write(&mut self, sample: f64) -> std::result::Result<f64, Fault> {
        let capacity = self.buffer.len();
        if self.cursor >= capacity {
            self.faulted = true;
            return Err(Fault::CursorOutOfRange {
                cursor: self.cursor,
                capacity,
            });
        }
        if !sample.is_finite() {
            self.faulted = true;
            self.buffer[self.cursor] = 0.0;
            return Err(Fault::NonFinite(sample));
        }
        let sample = if self.faulted { 0.0 } else { sample };
        self.buffer[self.cursor] = sample;
        Ok(sample)
    }

    /// Adds an upstream source. Returns false if it was already connected.
    pub fn connect_input(&mut self, source: ComponentId) -> bool {
        if self.inputs.contains(&source) {
            warn!(id = self.id, source, "input is already connected");
            return false;
        }
        self.inputs.push(source);
        true
    }

    /// Removes an upstream source. Returns false if it was not connected.
    pub fn disconnect_input(&mut self, source: ComponentId) -> bool {
        match self.inputs.iter().position(|s| *s == source) {
            Some(index) => {
                self.inputs.remove(index);
                true
            }
            None => {
                warn!(id = self.id, source, "input is not connected");
                false
            }
        }
    }

    /// Sum of the current samples of every upstream source.
    pub fn sum_inputs(&self, view: &dyn SignalView) -> f64 {
        self.inputs.iter().map(|id| view.current_sample(*id)).sum()
    }

    pub fn bindings(&self) -> &[ModulationBinding] {
        &self.bindings
    }

    pub fn binding(&self, parameter: ParameterType) -> Option<&ModulationBinding> {
        self.bindings.iter().find(|b| b.parameter == parameter)
    }

    /// Installs a binding, replacing any binding of the same parameter.
    pub fn bind(&mut self, binding: ModulationBinding) {
        match self
            .bindings
            .iter_mut()
            .find(|b| b.parameter == binding.parameter)
        {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
    }

    /// Removes the binding of a parameter and restores its base value.
    pub fn unbind(&mut self, parameter: ParameterType) -> Option<ModulationBinding> {
        let index = self.bindings.iter().position(|b| b.parameter == parameter)?;
        self.parameters.clear_instantaneous(parameter);
        Some(self.bindings.remove(index))
    }

    /// Removes every binding driven by `modulator`.
    pub fn unbind_modulator(&mut self, modulator: ComponentId) -> usize {
        let before = self.bindings.len();
        let parameters = &self.parameters;
        self.bindings.retain(|b| {
            let keep = b.modulator != modulator;
            if !keep {
                parameters.clear_instantaneous(b.parameter);
            }
            keep
        });
        before - self.bindings.len()
    }

    /// Evaluates the bindings accepted by `filter` and records the modulated
    /// values in the parameter store.
    pub fn apply_bindings(
        &mut self,
        view: &dyn SignalView,
        filter: impl Fn(ParameterType) -> bool,
    ) {
        let parameters = &self.parameters;
        for binding in self.bindings.iter_mut().filter(|b| filter(b.parameter)) {
            match view.modulator(binding.modulator) {
                Some(modulator) => {
                    let p = binding.parameter;
                    let value = modulator.modulate(
                        parameters.base_value(p),
                        p.modulation_strategy(),
                        &mut binding.data,
                    );
                    parameters.set_instantaneous(p, value);
                }
                None => parameters.clear_instantaneous(binding.parameter),
            }
        }
    }

    /// Stores a value if the descriptor lists the parameter as controllable.
    pub fn set_controllable(
        &self,
        parameter: ParameterType,
        value: ParameterValue,
    ) -> Result<ParameterValue> {
        if !self.descriptor.is_controllable(parameter) {
            return Err(EngineError::NotControllable {
                id: self.id,
                parameter,
            });
        }
        self.parameters.set(parameter, value)
    }

    /// Clears the buffer, cursor and fault flag. Connections and bindings stay.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
        self.faulted = false;
    }
}

/// The trait every graph component implements.
///
/// Implementations provide [`Module::next_sample`]; the provided methods
/// handle the cursor, parameters and bindings through [`ModuleCore`].
///
/// `Send` because instances are built on the control thread and moved to the
/// processing thread.
pub trait Module: Send {
    fn core(&self) -> &ModuleCore;

    fn core_mut(&mut self) -> &mut ModuleCore;

    /// Computes the next sample. Called once per tick after [`Module::tick`].
    fn next_sample(&mut self, ctx: &ProcessContext, view: &dyn SignalView) -> f64;

    fn component_type(&self) -> ComponentType {
        self.core().descriptor().component_type
    }

    fn id(&self) -> ComponentId {
        self.core().id()
    }

    /// Advances the write cursor by one slot.
    fn tick(&mut self) {
        self.core_mut().advance_cursor();
    }

    /// Computes one sample into the buffer at the cursor.
    fn calculate_sample(
        &mut self,
        ctx: &ProcessContext,
        view: &dyn SignalView,
    ) -> std::result::Result<f64, Fault> {
        let sample = if self.core().is_faulted() {
            0.0
        } else {
            self.next_sample(ctx, view)
        };
        self.core_mut().write(sample)
    }

    /// Sample at the cursor. No side effects.
    fn current_sample(&self) -> f64 {
        self.core().current_sample()
    }

    /// Evaluates modulation bindings before the sample is computed.
    fn apply_modulation(&mut self, view: &dyn SignalView) {
        self.core_mut().apply_bindings(view, |_| true);
    }

    fn connect_input(&mut self, source: ComponentId) -> bool {
        self.core_mut().connect_input(source)
    }

    fn disconnect_input(&mut self, source: ComponentId) -> bool {
        self.core_mut().disconnect_input(source)
    }

    /// Sets a controllable parameter, returning the stored value.
    fn set_parameter_value(
        &self,
        parameter: ParameterType,
        value: ParameterValue,
    ) -> Result<ParameterValue> {
        self.core().set_controllable(parameter, value)
    }

    /// Binds a modulatable parameter to a modulator.
    ///
    /// Empty `data` is seeded with zeros for the modulator's `required` keys.
    /// Replaces any existing binding of the parameter.
    fn set_parameter_modulation(
        &mut self,
        parameter: ParameterType,
        modulator: ComponentId,
        data: ModulationData,
        required: &[ModulationParameter],
    ) -> Result<()> {
        let core = self.core_mut();
        if !core.descriptor().is_modulatable(parameter) {
            return Err(EngineError::NotModulatable {
                id: core.id(),
                parameter,
            });
        }
        let data = if data.is_empty() {
            ModulationData::seeded(required)
        } else {
            data
        };
        core.bind(ModulationBinding::new(parameter, modulator, data));
        Ok(())
    }

    /// Drops the binding of a parameter. Returns false if there was none.
    fn clear_parameter_modulation(&mut self, parameter: ParameterType) -> bool {
        self.core_mut().unbind(parameter).is_some()
    }

    /// Drops every binding driven by `modulator`, returning how many went.
    fn clear_modulator(&mut self, modulator: ComponentId) -> usize {
        self.core_mut().unbind_modulator(modulator)
    }

    /// Receives a MIDI event from an upstream component or the control plane.
    fn on_midi(&mut self, _event: MidiEvent) {}

    /// Moves pending outgoing MIDI events into `out`.
    fn drain_midi(&mut self, _out: &mut Vec<MidiEvent>) {}

    /// The component as a modulator, if it is one.
    fn as_modulator(&self) -> Option<&dyn Modulator> {
        None
    }

    /// Voices of a polyphonic component. Empty for everything else.
    fn voices(&self) -> &[Voice] {
        &[]
    }

    /// Clears runtime state. Connections, bindings and parameters stay.
    fn reset(&mut self) {
        self.core_mut().reset();
    }
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id())
            .field("component_type", &self.component_type())
            .field("cursor", &self.core().cursor())
            .finish()
    }
}
