//! Component lifecycle on the control side.
//!
//! The [`ComponentManager`] keeps, per component id, the handle the control
//! plane writes parameters through and the model a control surface renders.
//! Both are inserted and removed together. Instances themselves are built
//! here and shipped to the processing loop inside an
//! [`EngineCommand::AddModule`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::dsp::context::BuildContext;
use crate::dsp::midi::MidiEvent;
use crate::dsp::parameter::{ParameterStore, ParameterType, ParameterValue};
use crate::dsp::port::Socket;
use crate::dsp::registry::{ComponentType, ModuleDescriptor, ModuleRegistry, ModulatorType};
use crate::engine::channels::CommandSink;
use crate::engine::commands::{ComponentId, EngineCommand};
use crate::engine::connections::{Connection, ConnectionManager};
use crate::error::{EngineError, Result};

/// Control-side access to a live component.
#[derive(Clone, Debug)]
pub struct ComponentHandle {
    pub component_type: ComponentType,
    pub descriptor: ModuleDescriptor,
    /// Shared with the instance on the processing side.
    pub parameters: Arc<ParameterStore>,
}

/// What a control surface shows for one component.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControlSurfaceModel {
    pub id: ComponentId,
    pub component_type: ComponentType,
    pub display_name: String,
    pub values: BTreeMap<ParameterType, ParameterValue>,
}

/// Creates, tracks and removes components.
pub struct ComponentManager {
    registry: Arc<ModuleRegistry>,
    build: BuildContext,
    handles: BTreeMap<ComponentId, ComponentHandle>,
    models: BTreeMap<ComponentId, ControlSurfaceModel>,
    connections: ConnectionManager,
    next_id: ComponentId,
}

impl ComponentManager {
    pub fn new(registry: Arc<ModuleRegistry>, build: BuildContext) -> Self {
        Self {
            registry,
            build,
            handles: BTreeMap::new(),
            models: BTreeMap::new(),
            connections: ConnectionManager::new(),
            next_id: 1,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Returns an id no live component uses.
    pub fn next_id(&mut self) -> ComponentId {
        while self.handles.contains_key(&self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Builds a component and sends it to the processing loop.
    ///
    /// Without an explicit `id` one is allocated, but only once every check
    /// has passed.
    pub fn add_component(
        &mut self,
        id: Option<ComponentId>,
        component_type: ComponentType,
        display_name: &str,
        sink: &mut impl CommandSink,
    ) -> Result<ComponentId> {
        if let Some(id) = id {
            if self.contains(id) {
                return Err(EngineError::DuplicateComponent(id));
            }
        }
        sink.reserve(1)?;
        let mut module = self.registry.create(component_type, &self.build)?;
        let id = match id {
            Some(id) => id,
            None => self.next_id(),
        };
        module.core_mut().set_id(id);

        let descriptor = *module.core().descriptor();
        let parameters = Arc::clone(module.core().parameters());
        let values = parameters.snapshot().into_iter().collect();

        sink.submit(EngineCommand::AddModule { id, module })?;

        self.connections.add_module(id, descriptor);
        self.handles.insert(
            id,
            ComponentHandle {
                component_type,
                descriptor,
                parameters,
            },
        );
        self.models.insert(
            id,
            ControlSurfaceModel {
                id,
                component_type,
                display_name: display_name.to_string(),
                values,
            },
        );
        debug!(id, %component_type, name = display_name, "component added");
        Ok(id)
    }

    /// Removes a component together with every connection touching it.
    ///
    /// Returns the connections that were torn down.
    pub fn remove_component(
        &mut self,
        id: ComponentId,
        sink: &mut impl CommandSink,
    ) -> Result<Vec<Connection>> {
        if !self.contains(id) {
            return Err(EngineError::ComponentNotFound(id));
        }
        sink.submit(EngineCommand::RemoveModule { id })?;

        let removed = self.connections.remove_module(id);
        self.handles.remove(&id);
        self.models.remove(&id);
        debug!(id, connections = removed.len(), "component removed");
        Ok(removed)
    }

    /// Writes a controllable parameter and mirrors it into the model.
    pub fn set_parameter(
        &mut self,
        id: ComponentId,
        parameter: ParameterType,
        value: ParameterValue,
    ) -> Result<ParameterValue> {
        let handle = self
            .handles
            .get(&id)
            .ok_or(EngineError::ComponentNotFound(id))?;
        if !handle.descriptor.is_controllable(parameter) {
            return Err(EngineError::NotControllable { id, parameter });
        }
        let stored = handle.parameters.set(parameter, value)?;

        let mut changed = vec![(parameter, stored)];
        if let (true, ParameterValue::Waveform(waveform)) = (handle.descriptor.polyphonic, stored)
        {
            let gain = self.build.oscillator.voice_gain(waveform);
            let gain = handle.parameters.set_f64(ParameterType::Gain, gain)?;
            changed.push((
                ParameterType::Gain,
                ParameterValue::from_f64(ParameterType::Gain.kind(), gain),
            ));
        }

        if let Some(model) = self.models.get_mut(&id) {
            model.values.extend(changed);
        }
        debug!(id, %parameter, value = %stored, "parameter set");
        Ok(stored)
    }

    /// Validates a connection and sends it to the processing loop.
    pub fn connect(
        &mut self,
        outbound: Socket,
        inbound: Socket,
        sink: &mut impl CommandSink,
    ) -> Result<Connection> {
        sink.reserve(1)?;
        let connection = self.connections.connect(outbound, inbound)?;
        if let Err(err) = sink.submit(EngineCommand::Connect(connection)) {
            let _ = self.connections.disconnect(&connection);
            return Err(err);
        }
        Ok(connection)
    }

    /// Removes a committed connection.
    pub fn disconnect(
        &mut self,
        connection: &Connection,
        sink: &mut impl CommandSink,
    ) -> Result<Connection> {
        if !self.connections.exists(connection) {
            return self.connections.disconnect(connection);
        }
        sink.reserve(1)?;
        let removed = self.connections.disconnect(connection)?;
        sink.submit(EngineCommand::Disconnect(removed))?;
        Ok(removed)
    }

    /// Delivers a note event to a component that takes MIDI.
    pub fn send_midi(
        &self,
        id: ComponentId,
        event: MidiEvent,
        sink: &mut impl CommandSink,
    ) -> Result<()> {
        let handle = self
            .handles
            .get(&id)
            .ok_or(EngineError::ComponentNotFound(id))?;
        let accepts = handle.component_type == ComponentType::Modulator(ModulatorType::MidiInput)
            || handle.descriptor.midi_inputs > 0;
        if !accepts {
            return Err(EngineError::NotMidiSource {
                id,
                component_type: handle.component_type,
            });
        }
        sink.submit(EngineCommand::Midi { id, event })
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn handle(&self, id: ComponentId) -> Option<&ComponentHandle> {
        self.handles.get(&id)
    }

    pub fn model(&self, id: ComponentId) -> Option<&ControlSurfaceModel> {
        self.models.get(&id)
    }

    /// Every model, ordered by id.
    pub fn models(&self) -> impl Iterator<Item = &ControlSurfaceModel> + '_ {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
