//! Connection bookkeeping on the control side.
//!
//! The [`ConnectionManager`] is the authoritative copy of the topology. It
//! validates every request against the current graph before anything is sent
//! to the processing loop, so the processing side only ever sees edges that
//! are known to be valid and acyclic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dsp::port::{PortClass, Socket};
use crate::dsp::registry::ModuleDescriptor;
use crate::engine::commands::ComponentId;
use crate::error::{EngineError, Result};

/// A directed edge between an outbound and an inbound socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub outbound: Socket,
    pub inbound: Socket,
}

impl Connection {
    pub fn new(outbound: Socket, inbound: Socket) -> Self {
        Self { outbound, inbound }
    }

    /// Returns true if either end belongs to `id`.
    pub fn touches(&self, id: ComponentId) -> bool {
        self.outbound.module == id || self.inbound.module == id
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.outbound, self.inbound)
    }
}

/// Validates and stores the connections between components.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Descriptors of every live component, for port arity checks.
    modules: BTreeMap<ComponentId, ModuleDescriptor>,
    /// Committed connections, in commit order.
    connections: Vec<Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a component's ports addressable.
    pub fn add_module(&mut self, id: ComponentId, descriptor: ModuleDescriptor) {
        self.modules.insert(id, descriptor);
    }

    /// Forgets a component and removes every connection touching it.
    ///
    /// Returns the removed connections.
    pub fn remove_module(&mut self, id: ComponentId) -> Vec<Connection> {
        self.modules.remove(&id);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.touches(id));
        self.connections = kept;
        if !removed.is_empty() {
            debug!(id, count = removed.len(), "removed connections of component");
        }
        removed
    }

    pub fn contains_module(&self, id: ComponentId) -> bool {
        self.modules.contains_key(&id)
    }

    /// Validates and commits a connection.
    ///
    /// Nothing changes unless every check passes.
    pub fn connect(&mut self, outbound: Socket, inbound: Socket) -> Result<Connection> {
        let connection = Connection::new(outbound, inbound);

        let out_desc = self.descriptor(outbound.module)?;
        let in_desc = self.descriptor(inbound.module)?;

        if outbound.is_inbound() {
            return Err(incompatible(outbound, inbound, "outbound socket is an input"));
        }
        if !inbound.is_inbound() {
            return Err(incompatible(outbound, inbound, "inbound socket is an output"));
        }
        if !outbound.class.compatible_with(&inbound.class) {
            return Err(incompatible(outbound, inbound, "signal types differ"));
        }
        if outbound.port >= out_desc.port_count(outbound.class) {
            return Err(incompatible(outbound, inbound, "outbound port out of range"));
        }
        if inbound.port >= in_desc.port_count(inbound.class) {
            return Err(incompatible(outbound, inbound, "inbound port out of range"));
        }

        if let (PortClass::ModulationIn, Some(parameter)) =
            (inbound.class, in_desc.modulated_parameter(inbound.port))
        {
            if let Some(existing) = self
                .connections
                .iter()
                .find(|c| c.inbound == inbound && c.outbound != outbound)
            {
                return Err(EngineError::AlreadyModulated {
                    id: inbound.module,
                    parameter,
                    modulator: existing.outbound.module,
                });
            }
        }

        if self.exists(&connection) {
            warn!(%connection, "connection already exists");
            return Err(EngineError::DuplicateConnection(connection));
        }

        if self.reaches(inbound.module, outbound.module) {
            return Err(EngineError::CycleDetected { outbound, inbound });
        }

        self.connections.push(connection);
        debug!(%connection, "connected");
        Ok(connection)
    }

    /// Removes a committed connection.
    pub fn disconnect(&mut self, connection: &Connection) -> Result<Connection> {
        match self.connections.iter().position(|c| c == connection) {
            Some(index) => {
                let removed = self.connections.remove(index);
                debug!(connection = %removed, "disconnected");
                Ok(removed)
            }
            None => {
                warn!(%connection, "connection is not present");
                Err(EngineError::ConnectionNotFound(*connection))
            }
        }
    }

    pub fn exists(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Every connection touching `id`.
    pub fn connections_of(&self, id: ComponentId) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter().filter(move |c| c.touches(id))
    }

    /// Resolves a port coordinate, checking that the port exists.
    pub fn socket(&self, module: ComponentId, port: usize, class: PortClass) -> Result<Socket> {
        let socket = Socket::new(module, port, class);
        let descriptor = self.descriptor(module)?;
        if port < descriptor.port_count(class) {
            Ok(socket)
        } else {
            Err(EngineError::SocketNotFound(socket))
        }
    }

    /// Every socket of a component, grouped by class in declaration order.
    pub fn sockets_of(&self, id: ComponentId) -> Result<Vec<Socket>> {
        let descriptor = self.descriptor(id)?;
        Ok(PortClass::ALL
            .iter()
            .flat_map(|&class| {
                (0..descriptor.port_count(class)).map(move |port| Socket::new(id, port, class))
            })
            .collect())
    }

    fn descriptor(&self, id: ComponentId) -> Result<&ModuleDescriptor> {
        self.modules
            .get(&id)
            .ok_or(EngineError::ComponentNotFound(id))
    }

    /// Depth-first search along committed edges of every class.
    fn reaches(&self, from: ComponentId, to: ComponentId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(
                self.connections
                    .iter()
                    .filter(|c| c.outbound.module == id)
                    .map(|c| c.inbound.module),
            );
        }
        false
    }
}

fn incompatible(outbound: Socket, inbound: Socket, reason: &'static str) -> EngineError {
    EngineError::IncompatibleSockets {
        outbound,
        inbound,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::parameter::ParameterType;
    use crate::error::ErrorKind;
    use crate::modules::{AudioOutput, Envelope, Lfo, MidiInput, Oscillator, PolyOscillator};

    fn audio(out: ComponentId, inp: ComponentId) -> (Socket, Socket) {
        (
            Socket::new(out, 0, PortClass::AudioOut),
            Socket::new(inp, 0, PortClass::AudioIn),
        )
    }

    /// 1 oscillator, 2 output, 3 lfo, 4 poly, 5 adsr, 6 midi input
    fn manager() -> ConnectionManager {
        let mut m = ConnectionManager::new();
        m.add_module(1, Oscillator::DESCRIPTOR);
        m.add_module(2, AudioOutput::DESCRIPTOR);
        m.add_module(3, Lfo::DESCRIPTOR);
        m.add_module(4, PolyOscillator::DESCRIPTOR);
        m.add_module(5, Envelope::ADSR);
        m.add_module(6, MidiInput::DESCRIPTOR);
        m
    }

    #[test]
    fn test_connect_and_query() {
        let mut m = manager();
        let (out, inp) = audio(1, 2);
        let c = m.connect(out, inp).unwrap();
        assert!(m.exists(&c));
        assert_eq!(m.len(), 1);
        assert_eq!(m.connections_of(1).count(), 1);
        assert_eq!(m.connections_of(3).count(), 0);
        assert_eq!(c.to_string(), "1:audio out#0 -> 2:audio in#0");
    }

    #[test]
    fn test_unknown_module() {
        let mut m = manager();
        let (out, inp) = audio(1, 99);
        let err = m.connect(out, inp).unwrap_err();
        assert_eq!(err, EngineError::ComponentNotFound(99));
        assert!(m.is_empty());
    }

    #[test]
    fn test_class_mismatch() {
        let mut m = manager();
        let err = m
            .connect(
                Socket::new(1, 0, PortClass::AudioOut),
                Socket::new(4, 0, PortClass::MidiIn),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incompatible);

        // reversed direction
        let err = m
            .connect(
                Socket::new(2, 0, PortClass::AudioIn),
                Socket::new(1, 0, PortClass::AudioOut),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incompatible);
    }

    #[test]
    fn test_port_out_of_range() {
        let mut m = manager();
        let err = m
            .connect(
                Socket::new(1, 1, PortClass::AudioOut),
                Socket::new(2, 0, PortClass::AudioIn),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleSockets { .. }));

        // the oscillator has two modulatable parameters
        let err = m
            .connect(
                Socket::new(3, 0, PortClass::ModulationOut),
                Socket::new(1, 2, PortClass::ModulationIn),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incompatible);
    }

    #[test]
    fn test_duplicate_is_rejected_without_change() {
        let mut m = manager();
        let (out, inp) = audio(1, 2);
        m.connect(out, inp).unwrap();
        let err = m.connect(out, inp).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateConnection(_)));
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_parameter_bound_to_one_modulator() {
        let mut m = manager();
        m.add_module(7, Lfo::DESCRIPTOR);
        let target = Socket::new(1, 1, PortClass::ModulationIn);
        m.connect(Socket::new(3, 0, PortClass::ModulationOut), target)
            .unwrap();

        let err = m
            .connect(Socket::new(7, 0, PortClass::ModulationOut), target)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::AlreadyModulated {
                id: 1,
                parameter: ParameterType::Frequency,
                modulator: 3,
            }
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let mut m = ConnectionManager::new();
        let passthrough = ModuleDescriptor {
            audio_outputs: 1,
            ..AudioOutput::DESCRIPTOR
        };
        m.add_module(1, passthrough);
        m.add_module(2, passthrough);

        let (a, b) = audio(1, 2);
        m.connect(a, b).unwrap();
        let (b_out, a_in) = audio(2, 1);
        let err = m.connect(b_out, a_in).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
        assert_eq!(m.len(), 1);

        let (self_out, self_in) = audio(1, 1);
        assert!(m.connect(self_out, self_in).is_err());
    }

    #[test]
    fn test_cycle_counts_every_class() {
        let mut m = manager();
        // midi input -> envelope -> poly (midi), envelope modulates poly amplitude
        m.connect(
            Socket::new(6, 0, PortClass::MidiOut),
            Socket::new(5, 0, PortClass::MidiIn),
        )
        .unwrap();
        m.connect(
            Socket::new(5, 0, PortClass::MidiOut),
            Socket::new(4, 0, PortClass::MidiIn),
        )
        .unwrap();
        m.connect(
            Socket::new(5, 0, PortClass::ModulationOut),
            Socket::new(4, 0, PortClass::ModulationIn),
        )
        .unwrap();
        assert_eq!(m.len(), 3);
        assert!(!m.reaches(4, 5));
        assert!(m.reaches(6, 4));
    }

    #[test]
    fn test_disconnect() {
        let mut m = manager();
        let (out, inp) = audio(1, 2);
        let c = m.connect(out, inp).unwrap();
        assert_eq!(m.disconnect(&c).unwrap(), c);
        assert!(!m.exists(&c));

        let err = m.disconnect(&c).unwrap_err();
        assert_eq!(err, EngineError::ConnectionNotFound(c));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_module_cascades() {
        let mut m = manager();
        let (out, inp) = audio(1, 2);
        m.connect(out, inp).unwrap();
        m.connect(
            Socket::new(3, 0, PortClass::ModulationOut),
            Socket::new(1, 0, PortClass::ModulationIn),
        )
        .unwrap();
        let (poly_out, out_in) = audio(4, 2);
        m.connect(poly_out, out_in).unwrap();

        let removed = m.remove_module(1);
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|c| c.touches(1)));
        assert_eq!(m.len(), 1);
        assert!(!m.contains_module(1));
        assert_eq!(m.connect(out, inp).unwrap_err(), EngineError::ComponentNotFound(1));
    }

    #[test]
    fn test_socket_lookup() {
        let m = manager();
        assert!(m.socket(1, 0, PortClass::AudioOut).is_ok());
        assert!(matches!(
            m.socket(1, 0, PortClass::AudioIn),
            Err(EngineError::SocketNotFound(_))
        ));
        assert!(matches!(
            m.socket(42, 0, PortClass::AudioOut),
            Err(EngineError::ComponentNotFound(42))
        ));

        let sockets = m.sockets_of(5).unwrap();
        // midi in, midi out, four modulation inputs, one modulation output
        assert_eq!(sockets.len(), 7);
        assert_eq!(sockets[0], Socket::new(5, 0, PortClass::MidiIn));
    }
}
