//! Audio Graph
//!
//! The processing-side copy of the component graph. Components live in an
//! arena of slots; connections are applied to them as input lists, MIDI
//! listener lists and modulation bindings. Components are evaluated once per
//! tick in topological order.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error, warn};

use crate::dsp::context::ProcessContext;
use crate::dsp::midi::{MidiEvent, NOTE_COUNT};
use crate::dsp::modulation::{ModulationData, Modulator};
use crate::dsp::module_trait::{Fault, Module, SignalView};
use crate::dsp::port::PortClass;

use super::commands::{ComponentId, EngineCommand, EngineEvent};
use super::connections::Connection;

/// A component in the arena.
struct Node {
    module: Box<dyn Module>,
    /// Components receiving this component's MIDI output.
    midi_listeners: Vec<ComponentId>,
    /// Set once the fault has been reported.
    fault_reported: bool,
}

/// Read access to every component except the one being processed.
struct ArenaView<'a> {
    slots: &'a [Option<Node>],
    index: &'a HashMap<ComponentId, usize>,
}

impl ArenaView<'_> {
    fn node(&self, id: ComponentId) -> Option<&Node> {
        self.index
            .get(&id)
            .and_then(|&slot| self.slots.get(slot))
            .and_then(Option::as_ref)
    }
}

impl SignalView for ArenaView<'_> {
    fn current_sample(&self, id: ComponentId) -> f64 {
        self.node(id).map_or(0.0, |n| n.module.current_sample())
    }

    fn modulator(&self, id: ComponentId) -> Option<&dyn Modulator> {
        self.node(id).and_then(|n| n.module.as_modulator())
    }
}

/// The audio processing graph.
pub struct AudioGraph {
    context: ProcessContext,

    /// Component arena. A slot is `None` while free or while its component
    /// is being processed.
    slots: Vec<Option<Node>>,

    /// Slot of each component id.
    index: HashMap<ComponentId, usize>,

    /// Slots available for reuse.
    free: Vec<usize>,

    /// Applied connections.
    connections: Vec<Connection>,

    /// Processing order (topologically sorted).
    processing_order: Vec<ComponentId>,

    /// Whether the processing order needs to be recomputed.
    needs_sort: bool,

    /// Scratch space for MIDI routing.
    midi_scratch: Vec<MidiEvent>,
}

impl AudioGraph {
    pub fn new(context: ProcessContext) -> Self {
        Self {
            context,
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            connections: Vec::new(),
            processing_order: Vec::new(),
            needs_sort: false,
            midi_scratch: Vec::with_capacity(2 * NOTE_COUNT),
        }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Returns the number of components in the graph.
    pub fn module_count(&self) -> usize {
        self.index.len()
    }

    /// Returns the number of applied connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the processing order as of the last update.
    pub fn processing_order(&self) -> &[ComponentId] {
        &self.processing_order
    }

    pub fn contains_module(&self, id: ComponentId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns a component by id.
    pub fn module(&self, id: ComponentId) -> Option<&dyn Module> {
        self.node(id).map(|n| n.module.as_ref())
    }

    /// Current sample of a component, silence if it does not exist.
    pub fn current_sample(&self, id: ComponentId) -> f64 {
        self.module(id).map_or(0.0, |m| m.current_sample())
    }

    /// Components receiving MIDI from `id`.
    pub fn midi_listeners(&self, id: ComponentId) -> &[ComponentId] {
        self.node(id)
            .map(|n| n.midi_listeners.as_slice())
            .unwrap_or(&[])
    }

    fn node(&self, id: ComponentId) -> Option<&Node> {
        self.index
            .get(&id)
            .and_then(|&slot| self.slots.get(slot))
            .and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: ComponentId) -> Option<&mut Node> {
        let slot = *self.index.get(&id)?;
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    // ========================================================================
    // Graph Modification
    // ========================================================================

    /// Adds a component. Returns it back if the id is taken.
    pub fn add_module(
        &mut self,
        id: ComponentId,
        mut module: Box<dyn Module>,
    ) -> Result<(), Box<dyn Module>> {
        if self.index.contains_key(&id) {
            return Err(module);
        }
        module.core_mut().set_id(id);
        let node = Node {
            module,
            midi_listeners: Vec::new(),
            fault_reported: false,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        self.needs_sort = true;
        Ok(())
    }

    /// Removes a component and everything wired to it.
    ///
    /// Returns the removed instance so the caller decides where it is dropped.
    pub fn remove_module(&mut self, id: ComponentId) -> Option<Box<dyn Module>> {
        let slot = self.index.remove(&id)?;
        let node = self.slots.get_mut(slot).and_then(Option::take)?;
        self.free.push(slot);

        for other in self.slots.iter_mut().flatten() {
            if other.module.core().inputs().contains(&id) {
                other.module.disconnect_input(id);
            }
            other.midi_listeners.retain(|l| *l != id);
            other.module.clear_modulator(id);
        }
        self.connections.retain(|c| !c.touches(id));

        self.needs_sort = true;
        Some(node.module)
    }

    /// Wires a connection validated on the control side.
    ///
    /// Returns false if either end is missing.
    pub fn connect(&mut self, connection: Connection) -> bool {
        let (outbound, inbound) = (connection.outbound, connection.inbound);
        if !self.contains_module(outbound.module) || !self.contains_module(inbound.module) {
            return false;
        }

        let wired = match outbound.class {
            PortClass::AudioOut => self
                .node_mut(inbound.module)
                .is_some_and(|n| n.module.connect_input(outbound.module)),
            PortClass::MidiOut => match self.node_mut(outbound.module) {
                Some(n) if !n.midi_listeners.contains(&inbound.module) => {
                    n.midi_listeners.push(inbound.module);
                    true
                }
                _ => false,
            },
            PortClass::ModulationOut => {
                let required = self
                    .node(outbound.module)
                    .and_then(|n| n.module.as_modulator())
                    .map(|m| m.required_parameters())
                    .unwrap_or(&[]);
                match self.node_mut(inbound.module) {
                    Some(n) => {
                        let descriptor = *n.module.core().descriptor();
                        descriptor
                            .modulated_parameter(inbound.port)
                            .is_some_and(|parameter| {
                                n.module
                                    .set_parameter_modulation(
                                        parameter,
                                        outbound.module,
                                        ModulationData::new(),
                                        required,
                                    )
                                    .is_ok()
                            })
                    }
                    None => false,
                }
            }
            PortClass::AudioIn | PortClass::MidiIn | PortClass::ModulationIn => false,
        };

        if wired {
            self.connections.push(connection);
            self.needs_sort = true;
        }
        wired
    }

    /// Unwires a connection. Returns false if it was not applied.
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        let Some(position) = self.connections.iter().position(|c| c == connection) else {
            return false;
        };
        self.connections.remove(position);

        let (outbound, inbound) = (connection.outbound, connection.inbound);
        match outbound.class {
            PortClass::AudioOut => {
                if let Some(n) = self.node_mut(inbound.module) {
                    n.module.disconnect_input(outbound.module);
                }
            }
            PortClass::MidiOut => {
                if let Some(n) = self.node_mut(outbound.module) {
                    n.midi_listeners.retain(|l| *l != inbound.module);
                }
            }
            PortClass::ModulationOut => {
                if let Some(n) = self.node_mut(inbound.module) {
                    if let Some(parameter) =
                        n.module.core().descriptor().modulated_parameter(inbound.port)
                    {
                        n.module.clear_parameter_modulation(parameter);
                    }
                }
            }
            PortClass::AudioIn | PortClass::MidiIn | PortClass::ModulationIn => {}
        }
        self.needs_sort = true;
        true
    }

    /// Clears runtime state of every component. Topology stays.
    pub fn reset(&mut self) {
        for node in self.slots.iter_mut().flatten() {
            node.module.reset();
            node.fault_reported = false;
        }
    }

    // ========================================================================
    // Topological Sort
    // ========================================================================

    /// Computes the topological order using Kahn's algorithm.
    ///
    /// Ready components are taken lowest id first, so the order is
    /// deterministic.
    fn compute_topological_order(&self) -> Vec<ComponentId> {
        let mut in_degree: HashMap<ComponentId, usize> =
            self.index.keys().map(|&id| (id, 0)).collect();

        for conn in &self.connections {
            if let Some(degree) = in_degree.get_mut(&conn.inbound.module) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<ComponentId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut result = Vec::with_capacity(self.index.len());

        while let Some(id) = ready.pop_first() {
            result.push(id);

            for conn in self.connections.iter().filter(|c| c.outbound.module == id) {
                if let Some(degree) = in_degree.get_mut(&conn.inbound.module) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(conn.inbound.module);
                    }
                }
            }
        }

        if result.len() < self.index.len() {
            // only reachable if a cycle slipped past validation
            let mut rest: Vec<ComponentId> = in_degree
                .into_iter()
                .filter(|(id, _)| !result.contains(id))
                .map(|(id, _)| id)
                .collect();
            rest.sort_unstable();
            warn!(?rest, "cycle in processing graph");
            result.extend(rest);
        }

        result
    }

    /// Updates the processing order if needed.
    pub fn update_processing_order(&mut self) {
        if self.needs_sort {
            self.processing_order = self.compute_topological_order();
            self.needs_sort = false;
            debug!(order = ?self.processing_order, "processing order updated");
        }
    }

    // ========================================================================
    // Command Handling
    // ========================================================================

    /// Applies an engine command.
    ///
    /// Returns an event for the control plane when there is something to
    /// report or hand back.
    pub fn handle_command(&mut self, command: EngineCommand) -> Option<EngineEvent> {
        debug!(?command, "applying command");
        match command {
            EngineCommand::AddModule { id, module } => match self.add_module(id, module) {
                Ok(()) => None,
                Err(module) => Some(EngineEvent::ModuleRetired { id, module }),
            },
            EngineCommand::RemoveModule { id } => match self.remove_module(id) {
                Some(module) => Some(EngineEvent::ModuleRetired { id, module }),
                None => Some(EngineEvent::CommandFailed {
                    command: "remove_module",
                    id,
                }),
            },
            EngineCommand::Connect(connection) => {
                if self.connect(connection) {
                    None
                } else {
                    Some(EngineEvent::CommandFailed {
                        command: "connect",
                        id: connection.inbound.module,
                    })
                }
            }
            EngineCommand::Disconnect(connection) => {
                if self.disconnect(&connection) {
                    None
                } else {
                    Some(EngineEvent::CommandFailed {
                        command: "disconnect",
                        id: connection.inbound.module,
                    })
                }
            }
            EngineCommand::Midi { id, event } => match self.node_mut(id) {
                Some(node) => {
                    node.module.on_midi(event);
                    None
                }
                None => Some(EngineEvent::CommandFailed { command: "midi", id }),
            },
            EngineCommand::Reset => {
                self.reset();
                None
            }
        }
    }

    // ========================================================================
    // Audio Processing
    // ========================================================================

    /// Advances every component by one sample.
    ///
    /// Per component, in processing order: advance the cursor, apply
    /// modulation, compute the sample, then hand its MIDI output to its
    /// listeners. `on_fault` is called the first time a component faults.
    pub fn process(&mut self, mut on_fault: impl FnMut(ComponentId, Fault)) {
        self.update_processing_order();

        for position in 0..self.processing_order.len() {
            let id = self.processing_order[position];
            let Some(&slot) = self.index.get(&id) else {
                continue;
            };
            let Some(mut node) = self.slots[slot].take() else {
                continue;
            };

            {
                let view = ArenaView {
                    slots: &self.slots,
                    index: &self.index,
                };
                node.module.tick();
                node.module.apply_modulation(&view);
                if let Err(fault) = node.module.calculate_sample(&self.context, &view) {
                    if !node.fault_reported {
                        node.fault_reported = true;
                        error!(id, %fault, "component faulted, output silenced");
                        on_fault(id, fault);
                    }
                }
            }

            node.module.drain_midi(&mut self.midi_scratch);
            if !self.midi_scratch.is_empty() {
                for &listener in &node.midi_listeners {
                    let target = self
                        .index
                        .get(&listener)
                        .and_then(|&s| self.slots.get_mut(s))
                        .and_then(Option::as_mut);
                    if let Some(target) = target {
                        for &event in &self.midi_scratch {
                            target.module.on_midi(event);
                        }
                    }
                }
                self.midi_scratch.clear();
            }

            self.slots[slot] = Some(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::context::BuildContext;
    use crate::dsp::module_trait::ModuleCore;
    use crate::dsp::parameter::{ParameterType, ParameterValue};
    use crate::dsp::port::Socket;
    use crate::dsp::registry::{ComponentType, ModuleDescriptor, ModuleType};
    use crate::modules::{AudioOutput, Envelope, Lfo, MidiInput, Oscillator, PolyOscillator};

    // ========================================================================
    // Test Modules
    // ========================================================================

    const PASSTHROUGH: ModuleDescriptor = ModuleDescriptor {
        name: "Passthrough",
        component_type: ComponentType::Module(ModuleType::AudioOutput),
        modulatable: &[ParameterType::Gain],
        controllable: &[ParameterType::Gain],
        audio_inputs: 1,
        audio_outputs: 1,
        midi_inputs: 0,
        midi_outputs: 0,
        modulation_outputs: 0,
        polyphonic: false,
    };

    /// Outputs `offset + Gain * sum(inputs)`.
    struct TestPassthrough {
        core: ModuleCore,
        offset: f64,
    }

    impl TestPassthrough {
        fn boxed(offset: f64) -> Box<dyn Module> {
            Box::new(Self {
                core: ModuleCore::new(PASSTHROUGH, 16),
                offset,
            })
        }
    }

    impl Module for TestPassthrough {
        fn core(&self) -> &ModuleCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ModuleCore {
            &mut self.core
        }

        fn next_sample(&mut self, _ctx: &ProcessContext, view: &dyn SignalView) -> f64 {
            let gain = self.core.parameters().effective_value(ParameterType::Gain);
            self.offset + gain * self.core.sum_inputs(view)
        }
    }

    fn audio(from: ComponentId, to: ComponentId) -> Connection {
        Connection::new(
            Socket::new(from, 0, PortClass::AudioOut),
            Socket::new(to, 0, PortClass::AudioIn),
        )
    }

    fn graph() -> AudioGraph {
        AudioGraph::new(ProcessContext::new(48_000.0, 16))
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[test]
    fn test_graph_creation() {
        let graph = graph();
        assert_eq!(graph.module_count(), 0);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.processing_order().is_empty());
    }

    #[test]
    fn test_add_and_remove_module() {
        let mut graph = graph();
        assert!(graph.add_module(1, TestPassthrough::boxed(1.0)).is_ok());
        assert!(graph.add_module(2, TestPassthrough::boxed(0.0)).is_ok());
        assert_eq!(graph.module_count(), 2);
        assert_eq!(graph.module(1).map(|m| m.id()), Some(1));

        // taken id is handed back
        assert!(graph.add_module(1, TestPassthrough::boxed(0.0)).is_err());

        let removed = graph.remove_module(1).unwrap();
        assert_eq!(removed.id(), 1);
        assert!(!graph.contains_module(1));
        assert!(graph.remove_module(999).is_none());

        // slot is reused
        assert!(graph.add_module(3, TestPassthrough::boxed(0.0)).is_ok());
        assert_eq!(graph.slots.len(), 2);
    }

    #[test]
    fn test_audio_connection_sums_inputs() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(0.25)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.5)).unwrap();
        graph.add_module(3, TestPassthrough::boxed(0.0)).unwrap();
        assert!(graph.connect(audio(1, 3)));
        assert!(graph.connect(audio(2, 3)));

        graph.process(|_, _| {});
        assert!((graph.current_sample(3) - 0.75).abs() < 1e-12);
        assert_eq!(graph.module(3).unwrap().core().inputs(), &[1, 2]);
    }

    #[test]
    fn test_connect_missing_module_fails() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(0.0)).unwrap();
        assert!(!graph.connect(audio(1, 999)));
        assert!(!graph.connect(audio(999, 1)));
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_disconnect() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(1.0)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.0)).unwrap();
        graph.connect(audio(1, 2));

        assert!(graph.disconnect(&audio(1, 2)));
        assert_eq!(graph.connection_count(), 0);
        assert!(!graph.disconnect(&audio(1, 2)));

        graph.process(|_, _| {});
        assert_eq!(graph.current_sample(2), 0.0);
    }

    #[test]
    fn test_remove_module_removes_connections() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(1.0)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.0)).unwrap();
        graph.add_module(3, TestPassthrough::boxed(0.0)).unwrap();
        graph.connect(audio(1, 2));
        graph.connect(audio(2, 3));

        graph.remove_module(2);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.module(3).unwrap().core().inputs().is_empty());

        // the downstream component keeps running without a dangling input
        graph.process(|_, _| {});
        assert_eq!(graph.current_sample(3), 0.0);
    }

    #[test]
    fn test_processing_order_chain() {
        let mut graph = graph();
        // added in reverse so insertion order does not give the answer
        graph.add_module(3, TestPassthrough::boxed(1.0)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.0)).unwrap();
        graph.add_module(1, TestPassthrough::boxed(0.0)).unwrap();
        graph.connect(audio(3, 2));
        graph.connect(audio(2, 1));

        graph.update_processing_order();
        assert_eq!(graph.processing_order(), &[3, 2, 1]);

        // one tick carries the value down the whole chain
        graph.process(|_, _| {});
        assert!((graph.current_sample(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_processing_order_is_deterministic() {
        let mut graph = graph();
        for id in [5, 3, 9, 1] {
            graph.add_module(id, TestPassthrough::boxed(0.0)).unwrap();
        }
        graph.update_processing_order();
        assert_eq!(graph.processing_order(), &[1, 3, 5, 9]);
    }

    #[test]
    fn test_cursor_advances_per_tick() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(0.5)).unwrap();
        for _ in 0..20 {
            graph.process(|_, _| {});
        }
        assert_eq!(graph.module(1).unwrap().core().cursor(), 20 % 16);
    }

    #[test]
    fn test_fault_reported_once() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(f64::NAN)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.0)).unwrap();
        graph.connect(audio(1, 2));

        let mut faults = Vec::new();
        for _ in 0..5 {
            graph.process(|id, fault| faults.push((id, fault)));
        }
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].0, 1);
        assert!(graph.module(1).unwrap().core().is_faulted());
        assert_eq!(graph.current_sample(2), 0.0);

        graph.reset();
        assert!(!graph.module(1).unwrap().core().is_faulted());
    }

    #[test]
    fn test_handle_command_events() {
        let mut graph = graph();
        let ctx = BuildContext::default();
        assert!(graph
            .handle_command(EngineCommand::AddModule {
                id: 1,
                module: Oscillator::build(&ctx),
            })
            .is_none());
        assert!(matches!(
            graph.handle_command(EngineCommand::RemoveModule { id: 1 }),
            Some(EngineEvent::ModuleRetired { id: 1, .. })
        ));
        assert!(matches!(
            graph.handle_command(EngineCommand::RemoveModule { id: 1 }),
            Some(EngineEvent::CommandFailed { id: 1, .. })
        ));
    }

    #[test]
    fn test_oscillator_into_output() {
        let ctx = BuildContext::default();
        let mut graph = AudioGraph::new(ctx.process);
        graph.add_module(1, Oscillator::build(&ctx)).unwrap();
        graph.add_module(2, AudioOutput::build(&ctx)).unwrap();
        assert!(graph.connect(audio(1, 2)));

        let mut peak: f64 = 0.0;
        for _ in 0..200 {
            graph.process(|_, _| {});
            assert!((graph.current_sample(2) - graph.current_sample(1)).abs() < 1e-12);
            peak = peak.max(graph.current_sample(2).abs());
        }
        assert!(peak > 0.9, "peak {peak}");
    }

    #[test]
    fn test_modulation_binding_and_unbinding() {
        let ctx = BuildContext::default();
        let mut graph = AudioGraph::new(ctx.process);
        graph.add_module(1, Lfo::build(&ctx)).unwrap();
        graph.add_module(2, Oscillator::build(&ctx)).unwrap();

        // modulation-in port 1 of the oscillator is Frequency
        let modulation = Connection::new(
            Socket::new(1, 0, PortClass::ModulationOut),
            Socket::new(2, 1, PortClass::ModulationIn),
        );
        assert!(graph.connect(modulation));
        let osc = graph.module(2).unwrap();
        assert_eq!(osc.core().bindings().len(), 1);
        assert_eq!(osc.core().bindings()[0].parameter, ParameterType::Frequency);

        graph.update_processing_order();
        assert_eq!(graph.processing_order(), &[1, 2]);

        for _ in 0..2_000 {
            graph.process(|_, _| {});
        }
        let params = graph.module(2).unwrap().core().parameters().clone();
        assert!(params.is_modulated(ParameterType::Frequency));
        assert!((params.effective_value(ParameterType::Frequency) - 440.0).abs() > 1e-6);

        assert!(graph.disconnect(&modulation));
        assert!(!params.is_modulated(ParameterType::Frequency));
        assert_eq!(params.effective_value(ParameterType::Frequency), 440.0);

        // removing the modulator also drops its bindings
        graph.connect(modulation);
        graph.remove_module(1);
        assert!(graph.module(2).unwrap().core().bindings().is_empty());
    }

    #[test]
    fn test_unbinding_reaches_held_voices() {
        let ctx = BuildContext::default();
        let mut graph = AudioGraph::new(ctx.process);
        graph.add_module(1, Lfo::build(&ctx)).unwrap();
        graph.add_module(2, PolyOscillator::build(&ctx)).unwrap();

        // modulation-in port 1 of the poly oscillator is Frequency
        let modulation = Connection::new(
            Socket::new(1, 0, PortClass::ModulationOut),
            Socket::new(2, 1, PortClass::ModulationIn),
        );
        let note_on = || EngineCommand::Midi {
            id: 2,
            event: MidiEvent::NoteOn {
                note: 69,
                velocity: 127,
            },
        };
        let voice_bindings = |graph: &AudioGraph| {
            graph.module(2).unwrap().voices()[0].bindings().len()
        };
        let voice_frequency = |graph: &AudioGraph| {
            graph.module(2).unwrap().voices()[0].frequency()
        };

        assert!(graph.connect(modulation));
        graph.handle_command(note_on());
        for _ in 0..2_000 {
            graph.process(|_, _| {});
        }
        assert_eq!(voice_bindings(&graph), 1);
        assert!((voice_frequency(&graph) - 440.0).abs() > 1e-6);

        // disconnecting stops the held note's modulation at once
        assert!(graph.disconnect(&modulation));
        assert_eq!(voice_bindings(&graph), 0);
        assert!((voice_frequency(&graph) - 440.0).abs() < 1e-9);
        graph.process(|_, _| {});
        assert!((voice_frequency(&graph) - 440.0).abs() < 1e-9);

        // so does removing the modulator
        assert!(graph.connect(modulation));
        graph.handle_command(note_on());
        for _ in 0..2_000 {
            graph.process(|_, _| {});
        }
        assert_eq!(voice_bindings(&graph), 1);
        assert!(graph.remove_module(1).is_some());
        assert_eq!(voice_bindings(&graph), 0);
        graph.process(|_, _| {});
        assert!((voice_frequency(&graph) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_midi_routing_through_envelope() {
        let ctx = BuildContext::default();
        let mut graph = AudioGraph::new(ctx.process);
        graph.add_module(1, MidiInput::build(&ctx)).unwrap();
        graph.add_module(2, Envelope::build_adsr(&ctx)).unwrap();
        graph.add_module(3, PolyOscillator::build(&ctx)).unwrap();
        graph.add_module(4, AudioOutput::build(&ctx)).unwrap();

        let midi = |from, to| {
            Connection::new(
                Socket::new(from, 0, PortClass::MidiOut),
                Socket::new(to, 0, PortClass::MidiIn),
            )
        };
        assert!(graph.connect(midi(1, 2)));
        assert!(graph.connect(midi(2, 3)));
        assert!(graph.connect(Connection::new(
            Socket::new(2, 0, PortClass::ModulationOut),
            Socket::new(3, 0, PortClass::ModulationIn),
        )));
        assert!(graph.connect(audio(3, 4)));
        assert_eq!(graph.midi_listeners(1), &[2]);

        graph.handle_command(EngineCommand::Midi {
            id: 1,
            event: MidiEvent::NoteOn {
                note: 69,
                velocity: 127,
            },
        });
        let mut heard = false;
        for _ in 0..2_000 {
            graph.process(|_, _| {});
            heard |= graph.current_sample(4).abs() > 1e-3;
        }
        assert!(heard);

        graph.handle_command(EngineCommand::Midi {
            id: 1,
            event: MidiEvent::NoteOff { note: 69 },
        });
        // release is 0.2 s by default
        for _ in 0..(ctx.process.sample_rate as usize / 2) {
            graph.process(|_, _| {});
        }
        assert_eq!(graph.current_sample(4), 0.0);
    }

    #[test]
    fn test_parameter_writes_are_seen_next_tick() {
        let mut graph = graph();
        graph.add_module(1, TestPassthrough::boxed(1.0)).unwrap();
        graph.add_module(2, TestPassthrough::boxed(0.0)).unwrap();
        graph.connect(audio(1, 2));

        let store = graph.module(2).unwrap().core().parameters().clone();
        store.set(ParameterType::Gain, ParameterValue::Double(0.5)).unwrap();
        graph.process(|_, _| {});
        assert!((graph.current_sample(2) - 0.5).abs() < 1e-12);
    }
}
